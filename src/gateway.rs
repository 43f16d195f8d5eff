//! Persistence gateway seam
//!
//! The coordinator never talks to a backend directly; it hands a fully
//! stamped document to an injected [`PersistenceGateway`] and interprets the
//! outcome. Transports (HTTP, IPC, a local database) implement this trait.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Document;

/// Errors surfaced by a persistence gateway
///
/// Every variant is retried the same way by the coordinator; the distinction
/// exists for logging and for the failure notice shown to the user.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("backend rejected the write: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    /// True when the failure came from the transport rather than the backend
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Timeout(_))
    }
}

/// Asynchronous write path for documents
///
/// `save` returns `Ok(true)` when the document was durably stored, `Ok(false)`
/// when the backend declined without raising an error, and `Err` on failure.
/// The gateway owns its own timeout policy; the coordinator never cancels an
/// in-flight call.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn save(&self, document: &Document) -> Result<bool, GatewayError>;
}
