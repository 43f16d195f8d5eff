//! Document store seam
//!
//! The canonical "currently open document" lives outside the coordinator, in
//! the host application's store. The coordinator reads it to capture fresh
//! snapshots at execution time and writes back only the dirty markers that
//! keep unsaved-changes indicators honest.
//!
//! [`MemoryDocumentStore`] is a complete in-memory implementation so the
//! engine can run and be tested with no UI framework present.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tracing::debug;

use crate::domain::{Document, DocumentId};

/// Host-side store of open documents and their dirty state
pub trait DocumentStore: Send + Sync {
    /// The authoritative current state of a document, if the store has it
    fn current_document(&self, id: &DocumentId) -> Option<Document>;

    /// The document the user currently has open, if any
    fn active_document_id(&self) -> Option<DocumentId>;

    /// Record a pending (not yet persisted) state for a document
    fn mark_unsaved(&self, document: &Document);

    /// Clear the unsaved marker after a successful persist
    fn mark_saved(&self, id: &DocumentId);
}

/// In-memory [`DocumentStore`]
///
/// Keeps documents, an unsaved set, and the active document id behind
/// read-write locks. Suitable as the real store for embedded use and as the
/// collaborator in tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, Document>>,
    unsaved: RwLock<HashSet<DocumentId>>,
    active: RwLock<Option<DocumentId>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document
    pub fn insert(&self, document: Document) {
        debug!(document_id = %document.id, "MemoryDocumentStore::insert");
        self.documents
            .write()
            .expect("document map lock poisoned")
            .insert(document.id.clone(), document);
    }

    /// Remove a document entirely
    pub fn remove(&self, id: &DocumentId) {
        debug!(document_id = %id, "MemoryDocumentStore::remove");
        self.documents
            .write()
            .expect("document map lock poisoned")
            .remove(id);
        self.unsaved
            .write()
            .expect("unsaved set lock poisoned")
            .remove(id);
    }

    /// Set which document is currently open
    pub fn set_active(&self, id: Option<DocumentId>) {
        debug!(document_id = ?id, "MemoryDocumentStore::set_active");
        *self.active.write().expect("active id lock poisoned") = id;
    }

    /// True if the document has changes the gateway has not acknowledged
    pub fn is_unsaved(&self, id: &DocumentId) -> bool {
        self.unsaved
            .read()
            .expect("unsaved set lock poisoned")
            .contains(id)
    }

    /// Number of documents currently marked unsaved
    pub fn unsaved_count(&self) -> usize {
        self.unsaved.read().expect("unsaved set lock poisoned").len()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn current_document(&self, id: &DocumentId) -> Option<Document> {
        self.documents
            .read()
            .expect("document map lock poisoned")
            .get(id)
            .cloned()
    }

    fn active_document_id(&self) -> Option<DocumentId> {
        self.active.read().expect("active id lock poisoned").clone()
    }

    fn mark_unsaved(&self, document: &Document) {
        debug!(document_id = %document.id, "MemoryDocumentStore::mark_unsaved");
        let mut documents = self.documents.write().expect("document map lock poisoned");
        // a removed document stays removed; dirty state only applies to
        // documents the store still knows
        let Some(existing) = documents.get_mut(&document.id) else {
            return;
        };
        *existing = document.clone();
        self.unsaved
            .write()
            .expect("unsaved set lock poisoned")
            .insert(document.id.clone());
    }

    fn mark_saved(&self, id: &DocumentId) {
        debug!(document_id = %id, "MemoryDocumentStore::mark_saved");
        self.unsaved
            .write()
            .expect("unsaved set lock poisoned")
            .remove(id);
    }
}
