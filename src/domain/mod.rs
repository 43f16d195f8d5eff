//! Domain types for the save coordinator
//!
//! Core types: `DocumentId`, `Document`, and the `ChangeSet` delta that save
//! requests carry. Everything here is plain data; the coordination logic
//! lives in [`crate::coordinator`].

mod change;
mod document;
mod id;

pub use change::{ChangeSet, ContentChange};
pub use document::{Document, DocumentContent, ensure_json_string};
pub use id::DocumentId;
