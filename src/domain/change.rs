//! Change-sets
//!
//! A `ChangeSet` is the delta carried by a save request: only the fields the
//! caller actually touched. Change-sets merge (newest field wins) and apply
//! onto a snapshot without disturbing fields they never saw.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::{Document, ensure_json_string};

/// Partial content update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChange {
    /// New plain-text body, if changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// New rich-text payload, if changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_text: Option<String>,
}

impl ContentChange {
    /// A content change carrying both representations
    pub fn new(body: impl Into<String>, rich_text: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            rich_text: Some(rich_text.into()),
        }
    }

    /// A body-only content change
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            rich_text: None,
        }
    }
}

/// The delta carried by a save request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// New title, if changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// New content, if changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentChange>,

    /// When the edit that produced this change happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited: Option<DateTime<Utc>>,
}

impl ChangeSet {
    /// A title-only change
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// A content-only change
    pub fn content(content: ContentChange) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    /// True if the change carries no fields at all (a force-save flush)
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }

    /// Fill in `last_edited` if the caller did not supply one
    pub fn or_edited_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_edited = self.last_edited.or(Some(at));
        self
    }

    /// Fold a newer change into this one
    ///
    /// Newer fields overwrite on conflict, unspecified fields are preserved.
    /// `last_edited` takes the latest non-empty value.
    pub fn merge_from(&mut self, newer: ChangeSet) {
        if newer.title.is_some() {
            self.title = newer.title;
        }
        if newer.content.is_some() {
            self.content = newer.content;
        }
        self.last_edited = newer.last_edited.or(self.last_edited);
    }

    /// Apply this change onto a snapshot
    ///
    /// Only fields present in the change overwrite the snapshot; rich text is
    /// normalized to a JSON string on the way in.
    pub fn apply_to(&self, document: &mut Document) {
        if let Some(title) = &self.title {
            document.title = title.clone();
        }
        if let Some(content) = &self.content {
            if let Some(rich) = &content.rich_text {
                document.content.rich_text = Some(ensure_json_string(rich));
            }
            if let Some(body) = &content.body {
                document.content.body = Some(body.clone());
            }
        }
        if let Some(edited) = self.last_edited {
            document.updated_at = edited;
            document.last_edited = Some(edited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_merge_newer_field_wins() {
        let mut older = ChangeSet::title("first");
        older.merge_from(ChangeSet::title("second"));
        assert_eq!(older.title.as_deref(), Some("second"));
    }

    #[test]
    fn test_merge_preserves_unspecified_fields() {
        let mut older = ChangeSet::title("keep me");
        older.merge_from(ChangeSet::content(ContentChange::body("body")));
        assert_eq!(older.title.as_deref(), Some("keep me"));
        assert_eq!(
            older.content.as_ref().and_then(|c| c.body.as_deref()),
            Some("body")
        );
    }

    #[test]
    fn test_merge_last_edited_latest_non_empty() {
        let mut older = ChangeSet::title("a").or_edited_at(ts(100));
        older.merge_from(ChangeSet::title("b"));
        assert_eq!(older.last_edited, Some(ts(100)));

        older.merge_from(ChangeSet::title("c").or_edited_at(ts(200)));
        assert_eq!(older.last_edited, Some(ts(200)));
    }

    #[test]
    fn test_apply_only_touches_present_fields() {
        let mut doc = Document::new("d", "original");
        doc.content.body = Some("old body".to_string());
        doc.content.rich_text = Some("{\"v\":1}".to_string());

        ChangeSet::title("renamed").apply_to(&mut doc);
        assert_eq!(doc.title, "renamed");
        assert_eq!(doc.content.body.as_deref(), Some("old body"));
        assert_eq!(doc.content.rich_text.as_deref(), Some("{\"v\":1}"));
    }

    #[test]
    fn test_apply_normalizes_rich_text() {
        let mut doc = Document::new("d", "t");
        let change = ChangeSet::content(ContentChange {
            body: None,
            rich_text: Some("not json".to_string()),
        });
        change.apply_to(&mut doc);
        assert_eq!(doc.content.rich_text.as_deref(), Some("\"not json\""));
    }

    #[test]
    fn test_apply_stamps_edit_time() {
        let mut doc = Document::new("d", "t");
        let change = ChangeSet::title("x").or_edited_at(ts(500));
        change.apply_to(&mut doc);
        assert_eq!(doc.updated_at, ts(500));
        assert_eq!(doc.last_edited, Some(ts(500)));
    }

    #[test]
    fn test_is_empty() {
        assert!(ChangeSet::default().is_empty());
        assert!(!ChangeSet::title("t").is_empty());
        // a bare timestamp still counts as empty: nothing to persist
        assert!(ChangeSet::default().or_edited_at(ts(1)).is_empty());
    }
}
