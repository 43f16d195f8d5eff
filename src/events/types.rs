//! Event types emitted by the coordinator
//!
//! UI-visible save state is not internal truth; it is a stream of events the
//! host subscribes to. Informational notices (a superseded save) and failure
//! notices (retries exhausted) travel the same channel.

use serde::{Deserialize, Serialize};

use crate::domain::DocumentId;

/// A coordinator lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SaveEvent {
    /// A request began executing
    SaveStarted {
        document_id: DocumentId,
        request_id: String,
        version: u64,
    },

    /// A request persisted successfully
    SaveCompleted { document_id: DocumentId, version: u64 },

    /// A request was skipped because a newer intent superseded it
    ///
    /// Informational: the caller still resolved successfully.
    SaveSuperseded {
        document_id: DocumentId,
        stale_version: u64,
        current_version: u64,
    },

    /// The document was gone from the store at execution time
    DocumentMissing { document_id: DocumentId },

    /// A failed attempt is about to be retried after backoff
    SaveRetrying {
        document_id: DocumentId,
        attempt: u32,
        backoff_ms: u64,
    },

    /// Retries exhausted; the user should be told
    SaveFailed {
        document_id: DocumentId,
        attempts: u32,
        error: String,
    },

    /// Queue depth or processing state changed (UI feedback only)
    QueueChanged { pending: usize, processing: bool },
}

impl SaveEvent {
    /// Short name of the event variant
    pub fn event_type(&self) -> &'static str {
        match self {
            SaveEvent::SaveStarted { .. } => "SaveStarted",
            SaveEvent::SaveCompleted { .. } => "SaveCompleted",
            SaveEvent::SaveSuperseded { .. } => "SaveSuperseded",
            SaveEvent::DocumentMissing { .. } => "DocumentMissing",
            SaveEvent::SaveRetrying { .. } => "SaveRetrying",
            SaveEvent::SaveFailed { .. } => "SaveFailed",
            SaveEvent::QueueChanged { .. } => "QueueChanged",
        }
    }

    /// The document this event concerns, if any
    pub fn document_id(&self) -> Option<&DocumentId> {
        match self {
            SaveEvent::SaveStarted { document_id, .. }
            | SaveEvent::SaveCompleted { document_id, .. }
            | SaveEvent::SaveSuperseded { document_id, .. }
            | SaveEvent::DocumentMissing { document_id }
            | SaveEvent::SaveRetrying { document_id, .. }
            | SaveEvent::SaveFailed { document_id, .. } => Some(document_id),
            SaveEvent::QueueChanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let event = SaveEvent::SaveCompleted {
            document_id: DocumentId::from("d"),
            version: 1,
        };
        assert_eq!(event.event_type(), "SaveCompleted");

        let event = SaveEvent::QueueChanged {
            pending: 2,
            processing: true,
        };
        assert_eq!(event.event_type(), "QueueChanged");
    }

    #[test]
    fn test_document_id_accessor() {
        let id = DocumentId::from("doc-1");
        let event = SaveEvent::SaveFailed {
            document_id: id.clone(),
            attempts: 3,
            error: "offline".to_string(),
        };
        assert_eq!(event.document_id(), Some(&id));

        let event = SaveEvent::QueueChanged {
            pending: 0,
            processing: false,
        };
        assert!(event.document_id().is_none());
    }
}
