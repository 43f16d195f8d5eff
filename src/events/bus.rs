//! Event bus for save lifecycle events
//!
//! A thin wrapper over a tokio broadcast channel. The coordinator emits,
//! consumers (status indicators, toast surfaces, loggers) subscribe. Emission
//! is fire-and-forget: with no subscribers the event is dropped.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::SaveEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Broadcast bus for [`SaveEvent`]s
pub struct EventBus {
    tx: broadcast::Sender<SaveEvent>,
}

impl EventBus {
    /// Create a bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: SaveEvent) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SaveEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
