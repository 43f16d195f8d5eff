//! Save coordinator core
//!
//! One writer at a time. Edits enter through `enqueue`, which dedups against
//! the fingerprint cache, stamps a version, marks the document dirty, and
//! merges into the resident request for that document. A drain pass takes the
//! whole queue, collapses it to one request per document, and executes the
//! requests strictly in sequence with retry and backoff. Version counters
//! suppress writes that a newer intent has already superseded.
//!
//! Shared state lives behind one std mutex and critical sections never span
//! an await; gateway calls, backoff sleeps, and debounce timers all run with
//! the lock released.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SaveConfig;
use crate::domain::{ChangeSet, ContentChange, Document, DocumentId};
use crate::error::SaveError;
use crate::events::{EventBus, SaveEvent};
use crate::gateway::{GatewayError, PersistenceGateway};
use crate::store::DocumentStore;

use super::merge::merge_queue;
use super::request::{Fingerprint, SaveRequest, Waiter};

/// Point-in-time save state for one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveStatus {
    /// A request for this document is executing right now
    pub is_saving: bool,

    /// A request or an armed debounce timer exists for this document
    pub has_pending_save: bool,

    /// Queued (not yet executing) requests for this document
    pub pending_request_count: usize,
}

/// Cached execution-time state of a document
struct Snapshot {
    document: Document,
    touched: Instant,
}

/// Everything behind the state mutex
#[derive(Default)]
struct CoreState {
    queue: Vec<SaveRequest>,
    versions: HashMap<DocumentId, u64>,
    snapshots: HashMap<DocumentId, Snapshot>,
    fingerprints: HashMap<DocumentId, Fingerprint>,
    timers: HashMap<DocumentId, JoinHandle<()>>,
    processing: bool,
    /// Set when intake fired during a drain pass; the pass loops once more
    rerun: bool,
    /// Document whose request is at the gateway right now
    current: Option<DocumentId>,
}

struct Inner {
    config: SaveConfig,
    gateway: Arc<dyn PersistenceGateway>,
    store: Arc<dyn DocumentStore>,
    state: Mutex<CoreState>,
    events: EventBus,
    seq: AtomicU64,
    sweep: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().expect("coordinator state lock poisoned")
    }

    /// Freshest known state of a document
    ///
    /// Prefers the host store; a store miss falls back to the cached snapshot
    /// so saves survive the document being closed mid-flight. Refreshes the
    /// cache either way.
    fn capture_snapshot(&self, state: &mut CoreState, id: &DocumentId) -> Option<Document> {
        if let Some(document) = self.store.current_document(id) {
            state.snapshots.insert(
                id.clone(),
                Snapshot {
                    document: document.clone(),
                    touched: Instant::now(),
                },
            );
            return Some(document);
        }
        state.snapshots.get_mut(id).map(|snapshot| {
            snapshot.touched = Instant::now();
            snapshot.document.clone()
        })
    }

    /// Intake: dedup, stamp, dirty-mark, and queue a change
    ///
    /// Returns the receiver the caller awaits. With `force` the fingerprint
    /// check is skipped, so an empty change still flushes whatever the store
    /// currently holds.
    fn enqueue(
        inner: &Arc<Inner>,
        document_id: &DocumentId,
        changes: ChangeSet,
        debounce: bool,
        force: bool,
    ) -> oneshot::Receiver<Result<bool, SaveError>> {
        let (tx, rx): (Waiter, _) = oneshot::channel();

        let (pending, processing) = {
            let mut state = inner.lock_state();

            if !force
                && let Some(fingerprint) = state.fingerprints.get(document_id)
                && fingerprint.matches(&changes)
            {
                debug!(document_id = %document_id, "SaveCoordinator::enqueue: no-op, values already submitted");
                let _ = tx.send(Ok(true));
                return rx;
            }

            let version = {
                let counter = state.versions.entry(document_id.clone()).or_insert(0);
                *counter += 1;
                *counter
            };
            let seq = inner.seq.fetch_add(1, Ordering::Relaxed);
            let changes = changes.or_edited_at(Utc::now());

            state
                .fingerprints
                .entry(document_id.clone())
                .or_default()
                .record(&changes);

            if !changes.is_empty()
                && let Some(mut document) = inner.capture_snapshot(&mut state, document_id)
            {
                changes.apply_to(&mut document);
                state.snapshots.insert(
                    document_id.clone(),
                    Snapshot {
                        document: document.clone(),
                        touched: Instant::now(),
                    },
                );
                inner.store.mark_unsaved(&document);
            }

            match state
                .queue
                .iter_mut()
                .find(|request| &request.document_id == document_id)
            {
                Some(existing) => {
                    debug!(
                        document_id = %document_id,
                        request_id = %existing.id,
                        "SaveCoordinator::enqueue: merged into resident request"
                    );
                    existing.changes.merge_from(changes);
                    existing.version = version;
                    existing.push_waiter(tx);
                }
                None => {
                    let request =
                        SaveRequest::new(document_id.clone(), changes, version, seq, tx);
                    debug!(
                        document_id = %document_id,
                        request_id = %request.id,
                        version,
                        "SaveCoordinator::enqueue: queued"
                    );
                    state.queue.push(request);
                }
            }

            if debounce {
                Inner::arm_debounce(inner, &mut state, document_id.clone());
            }

            (state.queue.len(), state.processing)
        };

        inner.events.emit(SaveEvent::QueueChanged {
            pending,
            processing,
        });

        if !debounce {
            Inner::schedule_drain(inner);
        }

        rx
    }

    /// Restart the quiet-period timer for a document
    fn arm_debounce(inner: &Arc<Inner>, state: &mut CoreState, document_id: DocumentId) {
        if let Some(previous) = state.timers.remove(&document_id) {
            previous.abort();
        }
        let weak = Arc::downgrade(inner);
        let quiet = inner.config.debounce();
        let id = document_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let Some(inner) = weak.upgrade() else { return };
            {
                let mut state = inner.lock_state();
                state.timers.remove(&id);
            }
            Inner::schedule_drain(&inner);
        });
        state.timers.insert(document_id, handle);
    }

    /// Start a drain pass unless one is running
    ///
    /// A wakeup during an active pass sets `rerun` instead, so the running
    /// pass picks the new work up before clearing `processing`.
    fn schedule_drain(inner: &Arc<Inner>) {
        let start = {
            let mut state = inner.lock_state();
            if state.processing {
                state.rerun = true;
                false
            } else if state.queue.is_empty() {
                false
            } else {
                state.processing = true;
                true
            }
        };
        if start {
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                Inner::drain(inner).await;
            });
        }
    }

    /// Drain the queue, one request at a time
    async fn drain(inner: Arc<Inner>) {
        loop {
            let batch = {
                let mut state = inner.lock_state();
                state.rerun = false;
                let batch = std::mem::take(&mut state.queue);
                // a dequeued request no longer needs its quiet-period timer
                for request in &batch {
                    if let Some(timer) = state.timers.remove(&request.document_id) {
                        timer.abort();
                    }
                }
                batch
            };
            let batch = merge_queue(batch);
            debug!(requests = batch.len(), "SaveCoordinator::drain: pass started");

            let count = batch.len();
            for (index, request) in batch.into_iter().enumerate() {
                Inner::process_request(&inner, request).await;
                if index + 1 < count {
                    tokio::time::sleep(inner.config.inter_save_delay()).await;
                }
            }

            let done = {
                let mut state = inner.lock_state();
                if state.rerun && !state.queue.is_empty() {
                    None
                } else {
                    state.processing = false;
                    state.current = None;
                    Some(state.queue.len())
                }
            };
            if let Some(pending) = done {
                inner.events.emit(SaveEvent::QueueChanged {
                    pending,
                    processing: false,
                });
                return;
            }
        }
    }

    /// Execute one request with retry and settle every waiter
    async fn process_request(inner: &Arc<Inner>, mut request: SaveRequest) {
        {
            let mut state = inner.lock_state();
            state.current = Some(request.document_id.clone());
        }
        let queued_ms = (Utc::now() - request.enqueued_at).num_milliseconds();
        debug!(
            document_id = %request.document_id,
            request_id = %request.id,
            version = request.version,
            queued_ms,
            "SaveCoordinator::process_request: starting"
        );
        inner.events.emit(SaveEvent::SaveStarted {
            document_id: request.document_id.clone(),
            request_id: request.id.clone(),
            version: request.version,
        });

        let mut last_error = None;
        for attempt in 1..=inner.config.max_attempts {
            if attempt > 1 {
                let backoff = inner.config.backoff_for_attempt(attempt);
                warn!(
                    document_id = %request.document_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "SaveCoordinator::process_request: retrying after backoff"
                );
                inner.events.emit(SaveEvent::SaveRetrying {
                    document_id: request.document_id.clone(),
                    attempt,
                    backoff_ms: backoff.as_millis() as u64,
                });
                tokio::time::sleep(backoff).await;
            }

            match Inner::execute(inner, &request).await {
                Ok(SaveOutcome::Saved) => {
                    debug!(
                        document_id = %request.document_id,
                        version = request.version,
                        "SaveCoordinator::process_request: saved"
                    );
                    inner.events.emit(SaveEvent::SaveCompleted {
                        document_id: request.document_id.clone(),
                        version: request.version,
                    });
                    request.settle(Ok(true));
                    return;
                }
                Ok(SaveOutcome::Superseded { current_version }) => {
                    debug!(
                        document_id = %request.document_id,
                        stale_version = request.version,
                        current_version,
                        "SaveCoordinator::process_request: superseded, skipping write"
                    );
                    inner.events.emit(SaveEvent::SaveSuperseded {
                        document_id: request.document_id.clone(),
                        stale_version: request.version,
                        current_version,
                    });
                    request.settle(Ok(true));
                    return;
                }
                Ok(SaveOutcome::Missing) => {
                    warn!(
                        document_id = %request.document_id,
                        "SaveCoordinator::process_request: document missing, nothing to save"
                    );
                    inner.events.emit(SaveEvent::DocumentMissing {
                        document_id: request.document_id.clone(),
                    });
                    request.settle(Ok(false));
                    return;
                }
                Err(err) => {
                    warn!(
                        document_id = %request.document_id,
                        attempt,
                        error = %err,
                        "SaveCoordinator::process_request: attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        let last = last_error
            .unwrap_or_else(|| GatewayError::Rejected("retry budget allowed no attempts".to_string()));
        error!(
            document_id = %request.document_id,
            attempts = inner.config.max_attempts,
            error = %last,
            "SaveCoordinator::process_request: retries exhausted"
        );
        inner.events.emit(SaveEvent::SaveFailed {
            document_id: request.document_id.clone(),
            attempts: inner.config.max_attempts,
            error: last.to_string(),
        });
        request.settle(Err(SaveError::Exhausted {
            document_id: request.document_id.clone(),
            attempts: inner.config.max_attempts,
            last,
        }));
    }

    /// One attempt: staleness check, snapshot capture, gateway call
    async fn execute(
        inner: &Arc<Inner>,
        request: &SaveRequest,
    ) -> Result<SaveOutcome, GatewayError> {
        let mut document = {
            let mut state = inner.lock_state();
            let current_version = state
                .versions
                .get(&request.document_id)
                .copied()
                .unwrap_or(0);
            if request.version < current_version {
                return Ok(SaveOutcome::Superseded { current_version });
            }
            match inner.capture_snapshot(&mut state, &request.document_id) {
                Some(document) => document,
                None => return Ok(SaveOutcome::Missing),
            }
        };

        request.changes.apply_to(&mut document);
        document.revision = Some(request.version);
        document.saved_at = Some(Utc::now());

        debug!(
            document_id = %request.document_id,
            request_id = %request.id,
            "SaveCoordinator::execute: dispatching to gateway"
        );
        if inner.gateway.save(&document).await? {
            {
                let mut state = inner.lock_state();
                state.snapshots.insert(
                    request.document_id.clone(),
                    Snapshot {
                        document: document.clone(),
                        touched: Instant::now(),
                    },
                );
            }
            inner.store.mark_saved(&request.document_id);
            Ok(SaveOutcome::Saved)
        } else {
            Err(GatewayError::Rejected(
                "gateway declined the write".to_string(),
            ))
        }
    }

    async fn sweep_loop(inner: Weak<Inner>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        // the immediate first tick is not a sweep
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match inner.upgrade() {
                Some(inner) => inner.sweep(),
                None => return,
            }
        }
    }

    /// Evict cold snapshots and the bookkeeping that goes with them
    ///
    /// Snapshots over the high-water mark shrink to the most recently touched
    /// few. Fingerprints follow their snapshot unless the document still has
    /// a queued request. Version counters are never evicted; staleness
    /// detection needs them monotonic for the life of the coordinator.
    fn sweep(&self) {
        let mut state = self.lock_state();
        let queued: HashSet<DocumentId> = state
            .queue
            .iter()
            .map(|request| request.document_id.clone())
            .collect();

        if state.snapshots.len() > self.config.snapshot_high_water {
            let mut by_touch: Vec<(DocumentId, Instant)> = state
                .snapshots
                .iter()
                .map(|(id, snapshot)| (id.clone(), snapshot.touched))
                .collect();
            by_touch.sort_by_key(|(_, touched)| std::cmp::Reverse(*touched));
            let keep: HashSet<DocumentId> = by_touch
                .into_iter()
                .take(self.config.snapshot_retain)
                .map(|(id, _)| id)
                .collect();

            let evicted = state.snapshots.len() - keep.len();
            state.snapshots.retain(|id, _| keep.contains(id));
            state
                .fingerprints
                .retain(|id, _| keep.contains(id) || queued.contains(id));
            debug!(
                evicted,
                retained = keep.len(),
                "SaveCoordinator::sweep: evicted cold snapshots"
            );
        }

        // timers whose request already drained have nothing left to trigger
        let stale: Vec<DocumentId> = state
            .timers
            .keys()
            .filter(|id| !queued.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(handle) = state.timers.remove(&id) {
                handle.abort();
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut sweep) = self.sweep.lock()
            && let Some(handle) = sweep.take()
        {
            handle.abort();
        }
        if let Ok(mut state) = self.state.lock() {
            for (_, handle) in state.timers.drain() {
                handle.abort();
            }
        }
    }
}

/// Handle to the save coordination engine
///
/// Cheap to clone; all clones share one queue, one set of version counters,
/// and one drain loop. Must be created inside a tokio runtime (the background
/// sweep is spawned at construction).
#[derive(Clone)]
pub struct SaveCoordinator {
    inner: Arc<Inner>,
}

impl SaveCoordinator {
    pub fn new(
        config: SaveConfig,
        gateway: Arc<dyn PersistenceGateway>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        let sweep_interval = config.sweep_interval();
        let inner = Arc::new(Inner {
            config,
            gateway,
            store,
            state: Mutex::new(CoreState::default()),
            events,
            seq: AtomicU64::new(0),
            sweep: Mutex::new(None),
        });

        let handle = tokio::spawn(Inner::sweep_loop(Arc::downgrade(&inner), sweep_interval));
        *inner.sweep.lock().expect("sweep handle lock poisoned") = Some(handle);

        info!(
            debounce_ms = inner.config.debounce_ms,
            max_attempts = inner.config.max_attempts,
            sweep_interval_ms = inner.config.sweep_interval_ms,
            "SaveCoordinator::new"
        );
        Self { inner }
    }

    /// Save a title edit, debounced
    ///
    /// Resolves `Ok(true)` once the edit (possibly merged with later ones) is
    /// persisted, was a no-op, or was superseded by a newer intent; `Ok(false)`
    /// if the document no longer exists anywhere.
    pub async fn save_title(
        &self,
        id: impl Into<DocumentId>,
        title: impl Into<String>,
    ) -> Result<bool, SaveError> {
        self.save_changes(id, ChangeSet::title(title)).await
    }

    /// Save a content edit, debounced
    pub async fn save_content(
        &self,
        id: impl Into<DocumentId>,
        content: ContentChange,
    ) -> Result<bool, SaveError> {
        self.save_changes(id, ChangeSet::content(content)).await
    }

    /// Save an arbitrary change-set, debounced
    pub async fn save_changes(
        &self,
        id: impl Into<DocumentId>,
        changes: ChangeSet,
    ) -> Result<bool, SaveError> {
        let id = id.into();
        let rx = Inner::enqueue(&self.inner, &id, changes, true, false);
        Self::await_settlement(rx).await
    }

    /// Persist immediately, skipping debounce and the no-op check
    ///
    /// With no id the store's active document is flushed; resolves `Ok(false)`
    /// when there is none. Pending merged edits for the document ride along.
    pub async fn force_save(&self, id: Option<&DocumentId>) -> Result<bool, SaveError> {
        let id = match id {
            Some(id) => id.clone(),
            None => match self.inner.store.active_document_id() {
                Some(id) => id,
                None => {
                    debug!("SaveCoordinator::force_save: no active document");
                    return Ok(false);
                }
            },
        };
        let rx = Inner::enqueue(&self.inner, &id, ChangeSet::default(), false, true);
        Self::await_settlement(rx).await
    }

    /// Current save state for a document
    pub fn save_status(&self, id: &DocumentId) -> SaveStatus {
        let state = self.inner.lock_state();
        let pending = state
            .queue
            .iter()
            .filter(|request| &request.document_id == id)
            .count();
        let is_saving = state.current.as_ref().is_some_and(|current| current == id);
        SaveStatus {
            is_saving,
            has_pending_save: pending > 0 || state.timers.contains_key(id),
            pending_request_count: pending,
        }
    }

    /// Drop the cached snapshot for a closed document
    ///
    /// After this, a save can only proceed if the store still has the
    /// document.
    pub fn clear_snapshot(&self, id: &DocumentId) {
        let mut state = self.inner.lock_state();
        state.snapshots.remove(id);
    }

    /// Subscribe to save lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SaveEvent> {
        self.inner.events.subscribe()
    }

    async fn await_settlement(
        rx: oneshot::Receiver<Result<bool, SaveError>>,
    ) -> Result<bool, SaveError> {
        rx.await.unwrap_or(Err(SaveError::Shutdown))
    }
}

enum SaveOutcome {
    Saved,
    Superseded { current_version: u64 },
    Missing,
}
