//! Coordinator - actor that owns all operation state
//!
//! Every call is sent as a command to a single task, which applies it to the
//! state, dispatches the resulting notifications and only then replies. No
//! two commands ever interleave.

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::domain::{MemoId, Operation, OperationCategory, OperationId, OperationKind, Priority};
use crate::events::EventPublisher;
use crate::notify::{NotificationDispatcher, StatusObserver};
use crate::policy::ConflictPolicy;

use super::capacity::CapacityLimit;
use super::config::CoordinatorConfig;
use super::messages::{CoordCommand, CoordResponse, CoordinatorError, CoordinatorStats};
use super::state::CoordinatorState;

/// Handle to send commands to the coordinator
#[derive(Clone)]
pub struct Coordinator {
    tx: mpsc::Sender<CoordCommand>,
    capacity: CapacityLimit,
}

impl Coordinator {
    /// Spawn the coordinator actor
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &CoordinatorConfig, policy: ConflictPolicy, publisher: Arc<dyn EventPublisher>) -> Self {
        debug!(?config, "Coordinator::spawn: called");
        let capacity = CapacityLimit::new(config.max_concurrent);
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));

        let rules = policy.rules().len();
        let state = CoordinatorState::new(policy, capacity.clone());
        let dispatcher = NotificationDispatcher::new(publisher);
        tokio::spawn(actor_loop(state, dispatcher, rx, capacity.subscribe()));

        info!(max_concurrent = config.max_concurrent, rules, "Coordinator spawned");
        Self { tx, capacity }
    }

    /// Live capacity limit shared with the actor
    pub fn capacity(&self) -> &CapacityLimit {
        &self.capacity
    }

    /// Change the capacity limit; queued work is re-evaluated
    pub fn set_capacity(&self, max_concurrent: usize) {
        debug!(max_concurrent, "Coordinator::set_capacity: called");
        self.capacity.set(max_concurrent);
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> CoordCommand) -> CoordResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    /// Register a new operation with its category's default priority
    ///
    /// `Ok(None)` means the request was rejected.
    pub async fn register(&self, kind: OperationKind) -> CoordResponse<Option<OperationId>> {
        debug!(%kind, "Coordinator::register: called");
        self.request(|reply| CoordCommand::Register {
            kind,
            priority: None,
            reply,
        })
        .await
    }

    /// Register a new operation with an explicit queue priority
    pub async fn register_with_priority(
        &self,
        kind: OperationKind,
        priority: Priority,
    ) -> CoordResponse<Option<OperationId>> {
        debug!(%kind, %priority, "Coordinator::register_with_priority: called");
        self.request(|reply| CoordCommand::Register {
            kind,
            priority: Some(priority),
            reply,
        })
        .await
    }

    /// Try to start a pending operation
    pub async fn start(&self, id: OperationId) -> CoordResponse<bool> {
        debug!(%id, "Coordinator::start: called");
        self.request(|reply| CoordCommand::Start { id, reply }).await
    }

    pub async fn get(&self, id: OperationId) -> CoordResponse<Option<Operation>> {
        debug!(%id, "Coordinator::get: called");
        self.request(|reply| CoordCommand::Get { id, reply }).await
    }

    /// Cancel a pending or active operation
    ///
    /// Only updates coordinator state; the caller stops the actual work.
    /// Returns `Ok(false)` if the operation had already finished.
    pub async fn cancel(&self, id: OperationId) -> CoordResponse<bool> {
        debug!(%id, "Coordinator::cancel: called");
        self.request(|reply| CoordCommand::Cancel { id, reply }).await?
    }

    /// Mark an active operation completed
    pub async fn complete(&self, id: OperationId) -> CoordResponse<()> {
        debug!(%id, "Coordinator::complete: called");
        self.request(|reply| CoordCommand::Complete { id, reply }).await?
    }

    /// Mark a pending or active operation failed
    pub async fn fail(&self, id: OperationId, description: Option<String>) -> CoordResponse<()> {
        debug!(%id, ?description, "Coordinator::fail: called");
        self.request(|reply| CoordCommand::Fail { id, description, reply })
            .await?
    }

    /// Report progress (0.0..=1.0) for an active operation
    pub async fn update_progress(&self, id: OperationId, progress: f64) -> CoordResponse<bool> {
        debug!(%id, progress, "Coordinator::update_progress: called");
        self.request(|reply| CoordCommand::UpdateProgress { id, progress, reply })
            .await?
    }

    /// Start whatever queued work can start; returns how many started
    pub async fn process_queue(&self) -> CoordResponse<usize> {
        debug!("Coordinator::process_queue: called");
        self.request(|reply| CoordCommand::ProcessQueue { reply }).await
    }

    pub async fn list_active(&self) -> CoordResponse<Vec<Operation>> {
        debug!("Coordinator::list_active: called");
        self.request(|reply| CoordCommand::ListActive { reply }).await
    }

    /// Queued operations in promotion order
    pub async fn list_pending(&self) -> CoordResponse<Vec<Operation>> {
        debug!("Coordinator::list_pending: called");
        self.request(|reply| CoordCommand::ListPending { reply }).await
    }

    pub async fn list_for_memo(&self, memo_id: MemoId) -> CoordResponse<Vec<Operation>> {
        debug!(%memo_id, "Coordinator::list_for_memo: called");
        self.request(|reply| CoordCommand::ListForMemo { memo_id, reply })
            .await
    }

    pub async fn list_all(&self) -> CoordResponse<Vec<Operation>> {
        debug!("Coordinator::list_all: called");
        self.request(|reply| CoordCommand::ListAll { reply }).await
    }

    /// The active operation of a category for a memo, e.g. its recording
    pub async fn find_active(&self, memo_id: MemoId, category: OperationCategory) -> CoordResponse<Option<Operation>> {
        debug!(%memo_id, %category, "Coordinator::find_active: called");
        self.request(|reply| CoordCommand::FindActive {
            memo_id,
            category,
            reply,
        })
        .await
    }

    pub async fn stats(&self) -> CoordResponse<CoordinatorStats> {
        debug!("Coordinator::stats: called");
        self.request(|reply| CoordCommand::Stats { reply }).await
    }

    /// Remove a finished operation's record
    pub async fn clear(&self, id: OperationId) -> CoordResponse<Operation> {
        debug!(%id, "Coordinator::clear: called");
        self.request(|reply| CoordCommand::Clear { id, reply }).await?
    }

    /// Remove every finished record; returns how many were removed
    pub async fn clear_finished(&self) -> CoordResponse<usize> {
        debug!("Coordinator::clear_finished: called");
        self.request(|reply| CoordCommand::ClearFinished { reply }).await
    }

    /// Install the status observer
    ///
    /// Only a weak reference is kept; once the caller drops its `Arc` the
    /// observer is silently skipped.
    pub async fn set_observer(&self, observer: &Arc<dyn StatusObserver>) -> CoordResponse<()> {
        debug!("Coordinator::set_observer: called");
        let observer: Weak<dyn StatusObserver> = Arc::downgrade(observer);
        self.request(|reply| CoordCommand::SetObserver {
            observer: Some(observer),
            reply,
        })
        .await
    }

    pub async fn clear_observer(&self) -> CoordResponse<()> {
        debug!("Coordinator::clear_observer: called");
        self.request(|reply| CoordCommand::SetObserver { observer: None, reply })
            .await
    }

    /// Stop the actor; later calls return `ChannelClosed`
    pub async fn shutdown(&self) -> CoordResponse<()> {
        debug!("Coordinator::shutdown: called");
        self.tx
            .send(CoordCommand::Shutdown)
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)
    }
}

/// The actor loop
async fn actor_loop(
    mut state: CoordinatorState,
    mut dispatcher: NotificationDispatcher,
    mut rx: mpsc::Receiver<CoordCommand>,
    mut capacity_rx: watch::Receiver<usize>,
) {
    debug!("actor_loop: called");
    let mut watching_capacity = true;

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("actor_loop: all handles dropped");
                    break;
                };
                if !handle_command(&mut state, &mut dispatcher, cmd).await {
                    break;
                }
            }
            changed = capacity_rx.changed(), if watching_capacity => {
                match changed {
                    Ok(()) => {
                        let limit = *capacity_rx.borrow_and_update();
                        debug!(limit, "actor_loop: capacity changed");
                        state.process_queue();
                        dispatcher.dispatch(state.drain_notifications()).await;
                    }
                    Err(_) => {
                        debug!("actor_loop: capacity sender dropped");
                        watching_capacity = false;
                    }
                }
            }
        }
    }

    info!("Coordinator stopped");
}

/// Apply one command; false once the actor should stop
async fn handle_command(
    state: &mut CoordinatorState,
    dispatcher: &mut NotificationDispatcher,
    cmd: CoordCommand,
) -> bool {
    match cmd {
        CoordCommand::Register { kind, priority, reply } => {
            debug!(%kind, ?priority, "actor_loop: Register command");
            let result = state.register(kind, priority);
            dispatcher.dispatch(state.drain_notifications()).await;
            let _ = reply.send(result);
        }

        CoordCommand::Start { id, reply } => {
            debug!(%id, "actor_loop: Start command");
            let result = state.start(id);
            dispatcher.dispatch(state.drain_notifications()).await;
            let _ = reply.send(result);
        }

        CoordCommand::Get { id, reply } => {
            let _ = reply.send(state.get(&id));
        }

        CoordCommand::Cancel { id, reply } => {
            debug!(%id, "actor_loop: Cancel command");
            let result = state.cancel(id);
            dispatcher.dispatch(state.drain_notifications()).await;
            let _ = reply.send(result);
        }

        CoordCommand::Complete { id, reply } => {
            debug!(%id, "actor_loop: Complete command");
            let result = state.complete(id);
            dispatcher.dispatch(state.drain_notifications()).await;
            let _ = reply.send(result);
        }

        CoordCommand::Fail { id, description, reply } => {
            debug!(%id, "actor_loop: Fail command");
            let result = state.fail(id, description);
            dispatcher.dispatch(state.drain_notifications()).await;
            let _ = reply.send(result);
        }

        CoordCommand::UpdateProgress { id, progress, reply } => {
            let result = state.update_progress(id, progress);
            dispatcher.dispatch(state.drain_notifications()).await;
            let _ = reply.send(result);
        }

        CoordCommand::ProcessQueue { reply } => {
            debug!("actor_loop: ProcessQueue command");
            let started = state.process_queue();
            dispatcher.dispatch(state.drain_notifications()).await;
            let _ = reply.send(started);
        }

        CoordCommand::ListActive { reply } => {
            let _ = reply.send(state.list_active());
        }

        CoordCommand::ListPending { reply } => {
            let _ = reply.send(state.list_pending());
        }

        CoordCommand::ListForMemo { memo_id, reply } => {
            let _ = reply.send(state.list_for_memo(&memo_id));
        }

        CoordCommand::ListAll { reply } => {
            let _ = reply.send(state.list_all());
        }

        CoordCommand::FindActive {
            memo_id,
            category,
            reply,
        } => {
            let _ = reply.send(state.find_active(&memo_id, category));
        }

        CoordCommand::Stats { reply } => {
            let _ = reply.send(state.stats());
        }

        CoordCommand::Clear { id, reply } => {
            debug!(%id, "actor_loop: Clear command");
            let _ = reply.send(state.clear(id));
        }

        CoordCommand::ClearFinished { reply } => {
            debug!("actor_loop: ClearFinished command");
            let _ = reply.send(state.clear_finished());
        }

        CoordCommand::SetObserver { observer, reply } => {
            dispatcher.set_observer(observer);
            let _ = reply.send(());
        }

        CoordCommand::Shutdown => {
            info!("Coordinator shutting down");
            return false;
        }
    }

    debug_assert!(
        state.check_invariants().is_ok(),
        "coordinator state inconsistent: {:?}",
        state.check_invariants()
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisMode, OperationStatus};
    use crate::events::EventBus;

    fn spawn(max_concurrent: usize) -> (Coordinator, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(64));
        let coordinator = Coordinator::spawn(
            &CoordinatorConfig::with_max_concurrent(max_concurrent),
            ConflictPolicy::default(),
            bus.clone(),
        );
        (coordinator, bus)
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let (coord, _bus) = spawn(2);
        let memo = MemoId::new();
        let id = coord.register(OperationKind::recording(memo)).await.unwrap().unwrap();

        let op = coord.get(id).await.unwrap().unwrap();
        assert_eq!(op.status, OperationStatus::Active);
        assert_eq!(op.memo_id(), memo);
        assert_eq!(coord.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let (coord, _bus) = spawn(2);
        assert!(coord.get(OperationId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_errors() {
        let (coord, _bus) = spawn(2);
        let id = OperationId::new();
        assert_eq!(coord.complete(id).await, Err(CoordinatorError::UnknownOperation(id)));
        assert_eq!(coord.cancel(id).await, Err(CoordinatorError::UnknownOperation(id)));
        assert!(!coord.start(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_raising_capacity_promotes_queue() {
        let (coord, _bus) = spawn(3);
        let memo = MemoId::new();
        let rec = coord.register(OperationKind::recording(memo)).await.unwrap().unwrap();
        let themes = coord
            .register(OperationKind::analysis(memo, AnalysisMode::Themes))
            .await
            .unwrap()
            .unwrap();
        let todos = coord
            .register(OperationKind::analysis(memo, AnalysisMode::Todos))
            .await
            .unwrap()
            .unwrap();

        // Squeeze capacity, finish the recording: only one analysis fits
        coord.set_capacity(1);
        coord.complete(rec).await.unwrap();
        assert_eq!(coord.list_active().await.unwrap().len(), 1);
        assert_eq!(coord.list_pending().await.unwrap().len(), 1);

        // Promotion happens on the actor's own schedule
        coord.set_capacity(3);
        let mut waited = 0;
        while coord.list_pending().await.unwrap().len() == 1 && waited < 50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            waited += 1;
        }
        assert!(coord.get(themes).await.unwrap().unwrap().is_active());
        assert!(coord.get(todos).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_shutdown_closes_channel() {
        let (coord, _bus) = spawn(2);
        coord.shutdown().await.unwrap();
        // Give the actor a chance to exit and drop its receiver
        let mut result = coord.list_all().await;
        for _ in 0..50 {
            if result.is_err() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            result = coord.list_all().await;
        }
        assert_eq!(result, Err(CoordinatorError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_events_published_before_reply() {
        let (coord, bus) = spawn(2);
        let mut rx = bus.subscribe();
        let memo = MemoId::new();

        let id = coord.register(OperationKind::recording(memo)).await.unwrap().unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type(), "RecordingStarted");
        assert_eq!(event.operation_id(), id);

        coord.complete(id).await.unwrap();
        assert_eq!(rx.try_recv().unwrap().event_type(), "RecordingCompleted");
    }
}
