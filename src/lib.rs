//! savequeue: a client-side save coordination engine
//!
//! Sits between a document editor and its persistence backend and turns a
//! stream of overlapping edit intents into ordered, deduplicated, conflict-
//! aware writes. Edits are debounced per document, merged while queued,
//! written strictly one at a time, retried with exponential backoff, and
//! suppressed when a newer intent has already superseded them.
//!
//! The host supplies two seams: a [`PersistenceGateway`] (the write path) and
//! a [`DocumentStore`] (the authoritative current document state plus dirty
//! markers). [`MemoryDocumentStore`] is a ready-made in-memory store.
//!
//! ```no_run
//! use std::sync::Arc;
//! use savequeue::{Document, MemoryDocumentStore, SaveConfig, SaveCoordinator};
//! # use savequeue::{Document as Doc, GatewayError, PersistenceGateway};
//! # struct NullGateway;
//! # #[async_trait::async_trait]
//! # impl PersistenceGateway for NullGateway {
//! #     async fn save(&self, _: &Doc) -> Result<bool, GatewayError> { Ok(true) }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryDocumentStore::new());
//! store.insert(Document::new("doc-1", "Untitled"));
//!
//! let coordinator = SaveCoordinator::new(SaveConfig::default(), Arc::new(NullGateway), store);
//! let saved = coordinator.save_title("doc-1", "Trip notes").await?;
//! assert!(saved);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod events;
pub mod gateway;
pub mod store;

pub use config::SaveConfig;
pub use coordinator::{SaveCoordinator, SaveStatus};
pub use domain::{ChangeSet, ContentChange, Document, DocumentContent, DocumentId, ensure_json_string};
pub use error::SaveError;
pub use events::{EventBus, SaveEvent};
pub use gateway::{GatewayError, PersistenceGateway};
pub use store::{DocumentStore, MemoryDocumentStore};
