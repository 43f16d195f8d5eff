//! Document model
//!
//! The full in-memory shape of an editable document as the coordinator sees
//! it: a title plus a two-part content payload (plain-text body and the rich
//! editor's JSON). Snapshots of this type are what get stamped and handed to
//! the persistence gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::DocumentId;

/// Content payload of a document
///
/// `rich_text` holds the editor's serialized JSON; `body` is the plain-text
/// rendering used for fingerprinting and search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    /// Plain text representation of the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Rich editor content, serialized as a JSON string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_text: Option<String>,
}

/// A full document snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier
    pub id: DocumentId,

    /// Display title
    pub title: String,

    /// Content payload
    #[serde(default)]
    pub content: DocumentContent,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last update time (content or metadata)
    pub updated_at: DateTime<Utc>,

    /// Last time the user edited the document, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited: Option<DateTime<Utc>>,

    /// Optimistic-concurrency version stamped by the coordinator at save time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,

    /// Timestamp of the save attempt that produced this state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Create a new document with empty content
    pub fn new(id: impl Into<DocumentId>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            content: DocumentContent::default(),
            created_at: now,
            updated_at: now,
            last_edited: None,
            revision: None,
            saved_at: None,
        }
    }
}

/// Normalize a rich-text payload to a JSON string
///
/// The editor hands over either already-serialized JSON or a raw string.
/// Anything that does not parse as JSON is wrapped as a JSON string literal
/// rather than stringified lossily.
pub fn ensure_json_string(value: &str) -> String {
    if serde_json::from_str::<serde_json::Value>(value).is_ok() {
        value.to_string()
    } else {
        serde_json::Value::String(value.to_string()).to_string()
    }
}
