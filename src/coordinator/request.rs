//! Save requests and fingerprints

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ChangeSet, DocumentId};
use crate::error::SaveError;

/// Channel half a caller awaits for its save result
pub(crate) type Waiter = oneshot::Sender<Result<bool, SaveError>>;

/// A queued save intent for one document
///
/// Owned exclusively by the request queue until dequeued for execution. At
/// most one effective request per document is resident at a time; later
/// intents merge into it and append their waiter, so every caller that
/// contributed is settled together, exactly once.
pub(crate) struct SaveRequest {
    /// Unique id for logging and status reporting
    pub id: String,

    pub document_id: DocumentId,

    /// Accumulated delta; later merges overwrite per field
    pub changes: ChangeSet,

    pub enqueued_at: DateTime<Utc>,

    /// Intake order across all documents; drives drain ordering
    pub seq: u64,

    /// Version stamped from the counter at the latest contributing intake
    pub version: u64,

    waiters: Vec<Waiter>,
}

impl SaveRequest {
    pub fn new(
        document_id: DocumentId,
        changes: ChangeSet,
        version: u64,
        seq: u64,
        waiter: Waiter,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            document_id,
            changes,
            enqueued_at: Utc::now(),
            seq,
            version,
            waiters: vec![waiter],
        }
    }

    /// Add another caller awaiting this request
    pub fn push_waiter(&mut self, waiter: Waiter) {
        self.waiters.push(waiter);
    }

    /// Absorb the waiters of a request merged into this one
    pub fn absorb_waiters(&mut self, other: &mut SaveRequest) {
        self.waiters.append(&mut other.waiters);
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// Settle every waiter with the same result
    ///
    /// Draining the list makes settlement idempotent; dropped receivers are
    /// callers that stopped waiting and are ignored.
    pub fn settle(&mut self, result: Result<bool, SaveError>) {
        debug!(
            document_id = %self.document_id,
            request_id = %self.id,
            waiters = self.waiters.len(),
            "SaveRequest::settle"
        );
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }
}

/// Last values actually submitted for a document
///
/// A cheap equality check to skip redundant writes. Deliberately tracks the
/// last *submitted* values, not the last values the gateway acknowledged: a
/// resubmit of an already-pending value is treated as pending rather than
/// re-queued. `force_save` bypasses this cache entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Fingerprint {
    title: Option<String>,
    body: Option<String>,
}

impl Fingerprint {
    /// True if nothing in the change differs from the last submitted values
    ///
    /// Only the title and the plain-text body participate; an empty change
    /// never matches.
    pub fn matches(&self, changes: &ChangeSet) -> bool {
        if changes.is_empty() {
            return false;
        }
        if let Some(title) = &changes.title {
            if self.title.as_deref() != Some(title.as_str()) {
                return false;
            }
        }
        if let Some(content) = &changes.content {
            let submitted = content.body.as_deref().unwrap_or("");
            if self.body.as_deref().unwrap_or("") != submitted {
                return false;
            }
        }
        true
    }

    /// Record the submitted values, field-wise
    ///
    /// Only fields present in the change overwrite the cached values, so a
    /// title-only change leaves the content fingerprint intact.
    pub fn record(&mut self, changes: &ChangeSet) {
        if let Some(title) = &changes.title {
            self.title = Some(title.clone());
        }
        if let Some(content) = &changes.content {
            self.body = Some(content.body.clone().unwrap_or_default());
        }
    }
}
