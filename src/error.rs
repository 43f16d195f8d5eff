//! Save error types

use thiserror::Error;

use crate::domain::DocumentId;
use crate::gateway::GatewayError;

/// Errors a save request can settle with
///
/// Only retry exhaustion fails loudly; no-op, not-found, and superseded
/// requests all resolve successfully. `Clone` because a merged request fans
/// its settlement out to every caller that contributed to it.
#[derive(Debug, Clone, Error)]
pub enum SaveError {
    /// Every attempt failed; carries the last gateway error
    #[error("save of {document_id} failed after {attempts} attempts: {last}")]
    Exhausted {
        document_id: DocumentId,
        attempts: u32,
        #[source]
        last: GatewayError,
    },

    /// The coordinator was dropped before the request settled
    #[error("save coordinator shut down before the request settled")]
    Shutdown,
}

impl SaveError {
    /// True if the request exhausted its retry budget
    pub fn is_exhausted(&self) -> bool {
        matches!(self, SaveError::Exhausted { .. })
    }

    /// The gateway error behind a terminal failure, if any
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            SaveError::Exhausted { last, .. } => Some(last),
            SaveError::Shutdown => None,
        }
    }
}
