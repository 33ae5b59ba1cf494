//! Event Bus - pub/sub for coarse coordinator events
//!
//! The EventBus uses a tokio broadcast channel to deliver events to all
//! subscribers. The coordinator only sees it through [`EventPublisher`].

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::CoordEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Sink for coarse events
///
/// Publishing is fire-and-forget; implementations must not block.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: CoordEvent);
}

/// Central event bus for coordinator activity
pub struct EventBus {
    tx: broadcast::Sender<CoordEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no subscribers, the event is dropped. If the channel is
    /// full, the oldest events are dropped for lagging receivers.
    pub fn emit(&self, event: CoordEvent) {
        debug!(
            event_type = event.event_type(),
            memo_id = %event.memo_id(),
            "EventBus::emit"
        );
        // Ignore send errors (no subscribers is OK)
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<CoordEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: CoordEvent) {
        self.emit(event);
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus(capacity: usize) -> Arc<EventBus> {
    Arc::new(EventBus::new(capacity))
}
