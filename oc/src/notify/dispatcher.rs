//! Notification dispatcher
//!
//! Fans each recorded transition out to the (optional, weakly held) status
//! observer and, for the narrow set of combinations that have one, a coarse
//! event on the event bus.

use std::mem::discriminant;
use std::sync::{Arc, Weak};

use tracing::{debug, trace, warn};

use crate::domain::{DetailedStatus, Operation, OperationStatus};
use crate::events::{CoordEvent, EventPublisher};

use super::observer::{OperationError, StatusObserver, StatusUpdate};

/// A transition recorded by the coordinator, awaiting dispatch
#[derive(Debug, Clone)]
pub struct Notification {
    /// Snapshot taken right after the change
    pub operation: Operation,
    /// Detailed status before the change; `None` for a new registration
    pub previous: Option<DetailedStatus>,
}

impl Notification {
    pub fn new(operation: Operation, previous: Option<DetailedStatus>) -> Self {
        Self { operation, previous }
    }

    pub fn current(&self) -> DetailedStatus {
        self.operation.detailed_status()
    }

    /// False for progress-only updates
    pub fn is_status_change(&self) -> bool {
        match &self.previous {
            Some(previous) => discriminant(previous) != discriminant(&self.current()),
            None => true,
        }
    }
}

/// Delivers notifications to the observer and the event publisher
pub struct NotificationDispatcher {
    observer: Option<Weak<dyn StatusObserver>>,
    publisher: Arc<dyn EventPublisher>,
}

impl NotificationDispatcher {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            observer: None,
            publisher,
        }
    }

    pub fn set_observer(&mut self, observer: Option<Weak<dyn StatusObserver>>) {
        debug!(has_observer = observer.is_some(), "NotificationDispatcher::set_observer: called");
        self.observer = observer;
    }

    /// Deliver notifications in order
    pub async fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.dispatch_one(notification).await;
        }
    }

    async fn dispatch_one(&self, notification: Notification) {
        let status_change = notification.is_status_change();
        let current = notification.current();
        let op = &notification.operation;
        trace!(id = %op.id, %current, status_change, "NotificationDispatcher::dispatch_one");

        match self.observer.as_ref().and_then(|weak| weak.upgrade()) {
            Some(observer) => {
                let update = StatusUpdate {
                    operation_id: op.id,
                    memo_id: op.memo_id(),
                    kind: op.kind,
                    previous: notification.previous.clone(),
                    current,
                };
                let callback = Arc::clone(&observer);
                isolate(op, "on_status_update", async move { callback.on_status_update(update).await }).await;

                if status_change {
                    let (id, memo_id, kind) = (op.id, op.memo_id(), op.kind);
                    match op.status {
                        OperationStatus::Completed => {
                            isolate(op, "on_complete", async move { observer.on_complete(id, memo_id, kind).await })
                                .await;
                        }
                        OperationStatus::Failed => {
                            let error = OperationError::from_description(op.error_description.as_deref());
                            isolate(op, "on_failure", async move {
                                observer.on_failure(id, memo_id, kind, error).await
                            })
                            .await;
                        }
                        _ => {}
                    }
                }
            }
            None => {
                trace!(id = %op.id, "NotificationDispatcher: no observer, skipping");
            }
        }

        if status_change && let Some(event) = CoordEvent::for_operation(op) {
            debug!(id = %op.id, event_type = event.event_type(), "NotificationDispatcher: publishing coarse event");
            self.publisher.publish(event);
        }
    }
}

/// Run one observer callback on its own task so a panic stays there
async fn isolate<F>(op: &Operation, callback: &'static str, call: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(call).await {
        warn!(id = %op.id, kind = %op.kind, callback, error = %e, "Status observer callback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MemoId, OperationId, OperationKind, Priority};
    use crate::events::EventBus;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<StatusUpdate>>,
        completed: Mutex<Vec<OperationId>>,
        failures: Mutex<Vec<(OperationId, String)>>,
    }

    #[async_trait]
    impl StatusObserver for Recorder {
        async fn on_status_update(&self, update: StatusUpdate) {
            self.updates.lock().unwrap().push(update);
        }

        async fn on_complete(&self, operation_id: OperationId, _memo_id: MemoId, _kind: OperationKind) {
            self.completed.lock().unwrap().push(operation_id);
        }

        async fn on_failure(
            &self,
            operation_id: OperationId,
            _memo_id: MemoId,
            _kind: OperationKind,
            error: OperationError,
        ) {
            self.failures.lock().unwrap().push((operation_id, error.to_string()));
        }
    }

    fn recording() -> Operation {
        Operation::new(OperationKind::recording(MemoId::new()), Priority::High, 0)
    }

    fn dispatcher_with(observer: &Arc<Recorder>, bus: Arc<EventBus>) -> NotificationDispatcher {
        let mut dispatcher = NotificationDispatcher::new(bus);
        let weak: Weak<dyn StatusObserver> = Arc::downgrade(observer) as Weak<dyn StatusObserver>;
        dispatcher.set_observer(Some(weak));
        dispatcher
    }

    #[tokio::test]
    async fn test_start_notifies_observer_and_bus() {
        let observer = Arc::new(Recorder::default());
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let dispatcher = dispatcher_with(&observer, bus.clone());

        let mut op = recording();
        let previous = op.detailed_status();
        op.transition(OperationStatus::Active, Utc::now());
        dispatcher.dispatch(vec![Notification::new(op.clone(), Some(previous))]).await;

        let updates = observer.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].operation_id, op.id);
        assert_eq!(updates[0].previous, Some(DetailedStatus::Queued));
        assert_eq!(updates[0].current, DetailedStatus::Processing { progress: None });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "RecordingStarted");
    }

    #[tokio::test]
    async fn test_progress_update_publishes_no_coarse_event() {
        let observer = Arc::new(Recorder::default());
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let dispatcher = dispatcher_with(&observer, bus.clone());

        let mut op = recording();
        op.transition(OperationStatus::Active, Utc::now());
        let previous = op.detailed_status();
        op.set_progress(0.5);
        let notification = Notification::new(op, Some(previous));
        assert!(!notification.is_status_change());
        dispatcher.dispatch(vec![notification]).await;

        assert_eq!(observer.updates.lock().unwrap().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_callback_wraps_description() {
        let observer = Arc::new(Recorder::default());
        let dispatcher = dispatcher_with(&observer, Arc::new(EventBus::new(16)));

        let mut op = recording();
        op.transition(OperationStatus::Active, Utc::now());
        let previous = op.detailed_status();
        op.transition(OperationStatus::Failed, Utc::now());
        op.error_description = Some("input device lost".to_string());
        dispatcher.dispatch(vec![Notification::new(op.clone(), Some(previous))]).await;

        let failures = observer.failures.lock().unwrap().clone();
        assert_eq!(failures, vec![(op.id, "input device lost".to_string())]);
        assert!(observer.completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completion_callback() {
        let observer = Arc::new(Recorder::default());
        let dispatcher = dispatcher_with(&observer, Arc::new(EventBus::new(16)));

        let mut op = recording();
        op.transition(OperationStatus::Active, Utc::now());
        let previous = op.detailed_status();
        op.transition(OperationStatus::Completed, Utc::now());
        dispatcher.dispatch(vec![Notification::new(op.clone(), Some(previous))]).await;

        assert_eq!(observer.completed.lock().unwrap().clone(), vec![op.id]);
    }

    #[tokio::test]
    async fn test_dropped_observer_is_skipped() {
        let observer = Arc::new(Recorder::default());
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let dispatcher = dispatcher_with(&observer, bus.clone());
        drop(observer);

        let mut op = recording();
        op.transition(OperationStatus::Active, Utc::now());
        dispatcher.dispatch(vec![Notification::new(op, Some(DetailedStatus::Queued))]).await;

        // The bus still gets its event
        assert_eq!(rx.recv().await.unwrap().event_type(), "RecordingStarted");
    }

    #[tokio::test]
    async fn test_no_observer_is_fine() {
        let dispatcher = NotificationDispatcher::new(Arc::new(EventBus::new(16)));
        dispatcher.dispatch(vec![Notification::new(recording(), None)]).await;
    }

    struct Panicking;

    #[async_trait]
    impl StatusObserver for Panicking {
        async fn on_status_update(&self, _update: StatusUpdate) {
            panic!("observer bug");
        }

        async fn on_complete(&self, _operation_id: OperationId, _memo_id: MemoId, _kind: OperationKind) {
            panic!("observer bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_observer_does_not_stop_dispatch() {
        let observer: Arc<dyn StatusObserver> = Arc::new(Panicking);
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let mut dispatcher = NotificationDispatcher::new(bus.clone());
        dispatcher.set_observer(Some(Arc::downgrade(&observer)));

        let mut op = recording();
        let queued = op.detailed_status();
        op.transition(OperationStatus::Active, Utc::now());
        let mut done = op.clone();
        let processing = done.detailed_status();
        done.transition(OperationStatus::Completed, Utc::now());

        dispatcher
            .dispatch(vec![Notification::new(op, Some(queued)), Notification::new(done, Some(processing))])
            .await;

        assert_eq!(rx.try_recv().unwrap().event_type(), "RecordingStarted");
        assert_eq!(rx.try_recv().unwrap().event_type(), "RecordingCompleted");
    }
}
