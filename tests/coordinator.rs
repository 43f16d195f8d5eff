//! End-to-end coordinator behavior against a scripted gateway

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use savequeue::{
    ContentChange, Document, DocumentId, DocumentStore, GatewayError, MemoryDocumentStore,
    PersistenceGateway, SaveConfig, SaveCoordinator, SaveEvent,
};

/// Test gateway with a scripted outcome per call
///
/// Outcomes pop front-to-back; an empty script means `Ok(true)`. Tracks every
/// document it was handed and the peak number of concurrent calls.
struct ScriptedGateway {
    script: Mutex<VecDeque<Result<bool, GatewayError>>>,
    calls: Mutex<Vec<Document>>,
    delay: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedGateway {
    fn ok() -> Arc<Self> {
        Self::with_script(Vec::new())
    }

    fn with_script(script: Vec<Result<bool, GatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            delay: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: Some(delay),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> Vec<Document> {
        self.calls.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceGateway for ScriptedGateway {
    async fn save(&self, document: &Document) -> Result<bool, GatewayError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        self.calls.lock().unwrap().push(document.clone());
        let result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(true));
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn fast_config() -> SaveConfig {
    SaveConfig {
        debounce_ms: 30,
        retry_base_delay_ms: 5,
        inter_save_delay_ms: 1,
        sweep_interval_ms: 60_000,
        ..SaveConfig::default()
    }
}

fn setup(gateway: Arc<ScriptedGateway>, config: SaveConfig) -> (SaveCoordinator, Arc<MemoryDocumentStore>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert(Document::new("doc-1", "Doc One"));
    store.insert(Document::new("doc-2", "Doc Two"));
    let coordinator = SaveCoordinator::new(config, gateway, store.clone());
    (coordinator, store)
}

fn offline() -> GatewayError {
    GatewayError::Transport("offline".to_string())
}

#[tokio::test]
async fn test_identical_resubmit_is_a_no_op() {
    let gateway = ScriptedGateway::ok();
    let (coordinator, _store) = setup(gateway.clone(), fast_config());

    assert!(coordinator.save_title("doc-1", "Same").await.unwrap());
    assert_eq!(gateway.call_count(), 1);

    // same value again: resolves without touching the gateway
    assert!(coordinator.save_title("doc-1", "Same").await.unwrap());
    assert_eq!(gateway.call_count(), 1);
}

#[tokio::test]
async fn test_overlapping_edits_merge_into_one_write() {
    let gateway = ScriptedGateway::ok();
    let (coordinator, _store) = setup(gateway.clone(), fast_config());

    let (title, content) = tokio::join!(
        coordinator.save_title("doc-1", "New Title"),
        coordinator.save_content("doc-1", ContentChange::body("New body")),
    );
    assert!(title.unwrap());
    assert!(content.unwrap());

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].title, "New Title");
    assert_eq!(calls[0].content.body.as_deref(), Some("New body"));
}

#[tokio::test]
async fn test_stale_request_is_superseded_not_written() {
    let gateway = ScriptedGateway::slow(Duration::from_millis(60));
    let (coordinator, _store) = setup(gateway.clone(), fast_config());
    let mut events = coordinator.subscribe();

    // two documents enter one drain pass; doc-1 holds the gateway long
    // enough for a newer doc-2 edit to arrive mid-pass
    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.save_title("doc-1", "One").await })
    };
    let stale = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.save_title("doc-2", "Old").await })
    };

    sleep(Duration::from_millis(45)).await;
    assert!(coordinator.save_title("doc-2", "New").await.unwrap());

    // the superseded caller still resolves successfully
    assert!(first.await.unwrap().unwrap());
    assert!(stale.await.unwrap().unwrap());

    // doc-2 hit the gateway once, with the newer title
    let doc2_calls: Vec<_> = gateway
        .calls()
        .into_iter()
        .filter(|doc| doc.id.as_str() == "doc-2")
        .collect();
    assert_eq!(doc2_calls.len(), 1);
    assert_eq!(doc2_calls[0].title, "New");

    let mut superseded = None;
    while let Ok(event) = events.try_recv() {
        if let SaveEvent::SaveSuperseded {
            stale_version,
            current_version,
            ..
        } = event
        {
            superseded = Some((stale_version, current_version));
        }
    }
    assert_eq!(superseded, Some((1, 2)));
}

#[tokio::test]
async fn test_retry_then_succeed() {
    let gateway = ScriptedGateway::with_script(vec![Err(offline()), Err(offline()), Ok(true)]);
    let (coordinator, _store) = setup(gateway.clone(), fast_config());

    assert!(coordinator.save_title("doc-1", "Persist me").await.unwrap());
    assert_eq!(gateway.call_count(), 3);
}

#[tokio::test]
async fn test_retries_exhausted_fails_and_leaves_dirty_marker() {
    let gateway = ScriptedGateway::with_script(vec![Err(offline()), Err(offline()), Err(offline())]);
    let (coordinator, store) = setup(gateway.clone(), fast_config());

    let err = coordinator
        .save_title("doc-1", "Doomed")
        .await
        .unwrap_err();
    assert!(err.is_exhausted());
    assert!(err.gateway_error().is_some_and(|e| e.is_transport()));
    assert_eq!(gateway.call_count(), 3);

    // the document stays flagged unsaved so the user can see it
    assert!(store.is_unsaved(&DocumentId::from("doc-1")));
}

#[tokio::test]
async fn test_drain_is_strictly_sequential() {
    let gateway = ScriptedGateway::slow(Duration::from_millis(40));
    let (coordinator, _store) = setup(gateway.clone(), fast_config());

    let (first, second) = tokio::join!(
        coordinator.save_title("doc-1", "One"),
        coordinator.save_title("doc-2", "Two"),
    );
    assert!(first.unwrap());
    assert!(second.unwrap());

    assert_eq!(gateway.max_concurrency(), 1);
    let order: Vec<String> = gateway
        .calls()
        .iter()
        .map(|doc| doc.id.as_str().to_string())
        .collect();
    assert_eq!(order, vec!["doc-1", "doc-2"]);
}

#[tokio::test]
async fn test_rapid_edits_coalesce_into_latest_value() {
    let gateway = ScriptedGateway::ok();
    let (coordinator, _store) = setup(gateway.clone(), fast_config());

    let mut pending = Vec::new();
    for n in 0..5 {
        let coordinator = coordinator.clone();
        pending.push(tokio::spawn(async move {
            coordinator
                .save_content("doc-1", ContentChange::body(format!("edit-{n}")))
                .await
        }));
        sleep(Duration::from_millis(5)).await;
    }
    for handle in pending {
        assert!(handle.await.unwrap().unwrap());
    }

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].content.body.as_deref(), Some("edit-4"));
}

#[tokio::test]
async fn test_every_merged_caller_settles() {
    let gateway = ScriptedGateway::ok();
    let (coordinator, _store) = setup(gateway.clone(), fast_config());

    let (a, b, c) = tokio::join!(
        coordinator.save_title("doc-1", "T"),
        coordinator.save_content("doc-1", ContentChange::body("B")),
        coordinator.save_title("doc-1", "T2"),
    );
    assert!(a.unwrap());
    assert!(b.unwrap());
    assert!(c.unwrap());

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].title, "T2");
    assert_eq!(calls[0].content.body.as_deref(), Some("B"));
}

#[tokio::test]
async fn test_missing_document_resolves_false() {
    let gateway = ScriptedGateway::ok();
    let (coordinator, _store) = setup(gateway.clone(), fast_config());

    let saved = coordinator.save_title("ghost", "No home").await.unwrap();
    assert!(!saved);
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn test_force_save_flushes_pending_edit_immediately() {
    let gateway = ScriptedGateway::ok();
    let config = SaveConfig {
        debounce_ms: 10_000,
        ..fast_config()
    };
    let (coordinator, _store) = setup(gateway.clone(), config);

    let pending = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.save_title("doc-1", "Edited").await })
    };
    sleep(Duration::from_millis(20)).await;
    assert_eq!(gateway.call_count(), 0);

    assert!(coordinator
        .force_save(Some(&DocumentId::from("doc-1")))
        .await
        .unwrap());
    assert!(pending.await.unwrap().unwrap());

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].title, "Edited");
}

#[tokio::test]
async fn test_force_save_uses_active_document() {
    let gateway = ScriptedGateway::ok();
    let (coordinator, store) = setup(gateway.clone(), fast_config());

    // nothing active: nothing to flush
    assert!(!coordinator.force_save(None).await.unwrap());
    assert_eq!(gateway.call_count(), 0);

    store.set_active(Some(DocumentId::from("doc-2")));
    assert!(coordinator.force_save(None).await.unwrap());

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id.as_str(), "doc-2");
    assert_eq!(calls[0].title, "Doc Two");
    assert_eq!(calls[0].revision, Some(1));
    assert!(calls[0].saved_at.is_some());
}

#[tokio::test]
async fn test_force_save_bypasses_fingerprint_after_failure() {
    let gateway = ScriptedGateway::with_script(vec![Err(offline()), Err(offline()), Err(offline())]);
    let (coordinator, _store) = setup(gateway.clone(), fast_config());

    let id = DocumentId::from("doc-1");
    assert!(coordinator.save_title("doc-1", "X").await.is_err());
    assert_eq!(gateway.call_count(), 3);

    // resubmitting the failed value dedups against the last submission
    assert!(coordinator.save_title("doc-1", "X").await.unwrap());
    assert_eq!(gateway.call_count(), 3);

    // force is the escape hatch: the pending state reaches the gateway
    assert!(coordinator.force_save(Some(&id)).await.unwrap());
    assert_eq!(gateway.call_count(), 4);
    assert_eq!(gateway.calls().last().unwrap().title, "X");
}

#[tokio::test]
async fn test_save_lifecycle_events() {
    let gateway = ScriptedGateway::ok();
    let (coordinator, _store) = setup(gateway.clone(), fast_config());
    let mut events = coordinator.subscribe();

    assert!(coordinator.save_title("doc-1", "Observed").await.unwrap());
    sleep(Duration::from_millis(10)).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let types: Vec<&str> = seen.iter().map(|event| event.event_type()).collect();

    let started = types.iter().position(|t| *t == "SaveStarted").unwrap();
    let completed = types.iter().position(|t| *t == "SaveCompleted").unwrap();
    assert!(started < completed);
    assert!(matches!(
        seen.last(),
        Some(SaveEvent::QueueChanged {
            pending: 0,
            processing: false,
        })
    ));
}

#[tokio::test]
async fn test_dirty_marker_tracks_save_lifecycle() {
    let gateway = ScriptedGateway::ok();
    let config = SaveConfig {
        debounce_ms: 10_000,
        ..fast_config()
    };
    let (coordinator, store) = setup(gateway.clone(), config);
    let id = DocumentId::from("doc-1");

    let pending = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.save_title("doc-1", "Dirty").await })
    };
    sleep(Duration::from_millis(20)).await;
    assert!(store.is_unsaved(&id));
    assert_eq!(store.current_document(&id).unwrap().title, "Dirty");

    assert!(coordinator.force_save(Some(&id)).await.unwrap());
    assert!(pending.await.unwrap().unwrap());
    assert!(!store.is_unsaved(&id));
}
