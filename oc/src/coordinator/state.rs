//! Coordinator state
//!
//! The synchronous core owned by the actor: operation store, active index,
//! pending queue, policy and counters. Every method runs to completion
//! without awaiting, so each check-then-act sequence is atomic with respect
//! to other commands. Observer and event traffic is recorded in an outbox and
//! dispatched by the actor afterwards.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::domain::{DetailedStatus, MemoId, Operation, OperationCategory, OperationId, OperationKind, OperationStatus};
use crate::notify::Notification;
use crate::policy::{ConflictPolicy, OperationConflict};

use super::capacity::CapacityLimit;
use super::messages::{CoordResponse, CoordinatorError, CoordinatorStats};
use super::queue::PendingQueue;
use super::store::OperationStore;

pub(crate) struct CoordinatorState {
    pub(super) store: OperationStore,
    pub(super) pending: PendingQueue,
    pub(super) policy: ConflictPolicy,
    pub(super) capacity: CapacityLimit,
    pub(super) stats: CoordinatorStats,
    pub(super) next_sequence: u64,
    outbox: Vec<Notification>,
}

impl CoordinatorState {
    pub(crate) fn new(policy: ConflictPolicy, capacity: CapacityLimit) -> Self {
        debug!(rules = policy.rules().len(), capacity = capacity.current(), "CoordinatorState::new: called");
        Self {
            store: OperationStore::new(),
            pending: PendingQueue::default(),
            policy,
            capacity,
            stats: CoordinatorStats::default(),
            next_sequence: 0,
            outbox: Vec::new(),
        }
    }

    /// True while the active count is below the live capacity
    pub(super) fn has_capacity(&self) -> bool {
        self.store.active_count() < self.capacity.current()
    }

    /// Conflicts between `kind` and the active operations of its memo
    pub(super) fn conflicts_for(&self, kind: &OperationKind) -> Vec<OperationConflict> {
        self.store
            .active_for(&kind.memo_id())
            .filter_map(|existing| self.policy.evaluate(existing, kind))
            .collect()
    }

    /// Queue a notification carrying the operation's current snapshot
    pub(super) fn record(&mut self, id: OperationId, previous: Option<DetailedStatus>) {
        if let Some(op) = self.store.get(&id) {
            self.outbox.push(Notification::new(op.clone(), previous));
        }
    }

    /// Try to move a pending operation to active
    ///
    /// Refuses (returning false, state untouched) for unknown ids, operations
    /// that are not pending, a full capacity, or any active conflict whose
    /// strategy is not `allow`.
    pub(crate) fn start(&mut self, id: OperationId) -> bool {
        debug!(%id, "CoordinatorState::start: called");
        let Some(op) = self.store.get(&id) else {
            error!(%id, "Start requested for unknown operation");
            return false;
        };
        if !op.is_pending() {
            warn!(%id, status = %op.status, "Start refused: operation is not pending");
            return false;
        }

        let kind = op.kind;
        let previous = op.detailed_status();

        if !self.has_capacity() {
            debug!(
                %id,
                %kind,
                active = self.store.active_count(),
                limit = self.capacity.current(),
                "Start deferred: at capacity"
            );
            return false;
        }

        if let Some(blocking) = self
            .conflicts_for(&kind)
            .into_iter()
            .find(|c| c.strategy.blocks_start())
        {
            debug!(
                %id,
                %kind,
                existing = %blocking.existing_id,
                existing_kind = %blocking.existing_kind,
                strategy = %blocking.strategy,
                "Start deferred: conflicts with active operation"
            );
            return false;
        }

        if let Err(e) = self.store.transition(id, OperationStatus::Active, Utc::now()) {
            error!(%id, error = %e, "Start failed");
            return false;
        }
        self.pending.remove(&id);

        let active = self.store.active_count();
        self.stats.started += 1;
        self.stats.peak_active = self.stats.peak_active.max(active);
        info!(%id, %kind, active, limit = self.capacity.current(), "Operation started");

        self.record(id, Some(previous));
        true
    }

    /// Move an operation to a terminal status
    ///
    /// With `promote`, frees the slot for queued work when the operation was
    /// active.
    pub(super) fn finish(
        &mut self,
        id: OperationId,
        next: OperationStatus,
        description: Option<String>,
        promote: bool,
    ) -> CoordResponse<()> {
        let op = self.store.get(&id).ok_or(CoordinatorError::UnknownOperation(id))?;
        let previous = op.detailed_status();
        let kind = op.kind;

        let was = self.store.transition(id, next, Utc::now())?;
        self.pending.remove(&id);

        match next {
            OperationStatus::Completed => {
                self.stats.completed += 1;
                info!(%id, %kind, "Operation completed");
            }
            OperationStatus::Failed => {
                self.stats.failed += 1;
                match &description {
                    Some(reason) => error!(%id, %kind, error = %reason, "Operation failed"),
                    None => error!(%id, %kind, "Operation failed"),
                }
                if let Some(reason) = description {
                    self.store.set_error(id, reason);
                }
            }
            OperationStatus::Cancelled => {
                self.stats.cancelled += 1;
                info!(%id, %kind, from = %was, "Operation cancelled");
            }
            OperationStatus::Pending | OperationStatus::Active => {}
        }

        self.record(id, Some(previous));

        if promote && was == OperationStatus::Active {
            self.process_queue();
        }
        Ok(())
    }

    /// Cancel a pending or active operation
    ///
    /// Returns `Ok(false)` when it had already finished.
    pub(crate) fn cancel(&mut self, id: OperationId) -> CoordResponse<bool> {
        debug!(%id, "CoordinatorState::cancel: called");
        let op = self.store.get(&id).ok_or(CoordinatorError::UnknownOperation(id))?;
        if op.status.is_terminal() {
            debug!(%id, status = %op.status, "CoordinatorState::cancel: already finished");
            return Ok(false);
        }
        self.finish(id, OperationStatus::Cancelled, None, true)?;
        Ok(true)
    }

    pub(crate) fn complete(&mut self, id: OperationId) -> CoordResponse<()> {
        debug!(%id, "CoordinatorState::complete: called");
        self.finish(id, OperationStatus::Completed, None, true)
    }

    pub(crate) fn fail(&mut self, id: OperationId, description: Option<String>) -> CoordResponse<()> {
        debug!(%id, ?description, "CoordinatorState::fail: called");
        self.finish(id, OperationStatus::Failed, description, true)
    }

    /// Record progress for an active operation; false when not active
    pub(crate) fn update_progress(&mut self, id: OperationId, progress: f64) -> CoordResponse<bool> {
        let op = self.store.get(&id).ok_or(CoordinatorError::UnknownOperation(id))?;
        let previous = op.detailed_status();
        if !self.store.set_progress(id, progress)? {
            return Ok(false);
        }
        self.record(id, Some(previous));
        Ok(true)
    }

    pub(crate) fn get(&self, id: &OperationId) -> Option<Operation> {
        self.store.get(id).cloned()
    }

    pub(crate) fn list_active(&self) -> Vec<Operation> {
        self.store.active().into_iter().cloned().collect()
    }

    /// Queued operations in promotion order
    pub(crate) fn list_pending(&self) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self
            .pending
            .ids()
            .iter()
            .filter_map(|id| self.store.get(id))
            .filter(|op| op.is_pending())
            .cloned()
            .collect();
        ops.sort_by(|a, b| a.queue_order(b));
        ops
    }

    /// Every stored operation of a memo, in registration order
    pub(crate) fn list_for_memo(&self, memo_id: &MemoId) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self
            .store
            .values()
            .filter(|op| op.memo_id() == *memo_id)
            .cloned()
            .collect();
        ops.sort_by_key(|op| op.sequence);
        ops
    }

    pub(crate) fn list_all(&self) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self.store.values().cloned().collect();
        ops.sort_by_key(|op| op.sequence);
        ops
    }

    pub(crate) fn find_active(&self, memo_id: &MemoId, category: OperationCategory) -> Option<Operation> {
        self.store
            .active_for(memo_id)
            .find(|op| op.category() == category)
            .cloned()
    }

    /// Drop a finished operation's record
    pub(crate) fn clear(&mut self, id: OperationId) -> CoordResponse<Operation> {
        debug!(%id, "CoordinatorState::clear: called");
        self.store.remove(id)
    }

    /// Drop every finished record
    pub(crate) fn clear_finished(&mut self) -> usize {
        let removed = self.store.remove_terminal();
        debug!(removed, remaining = self.store.len(), "CoordinatorState::clear_finished: done");
        removed
    }

    pub(crate) fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            active: self.store.active_count(),
            pending: self.pending.len(),
            ..self.stats.clone()
        }
    }

    /// Take the notifications recorded since the last call
    pub(crate) fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    /// Check store, index and queue agree with each other
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        self.store.check_consistency()?;

        let mut seen = HashSet::new();
        for id in self.pending.ids() {
            if !seen.insert(*id) {
                return Err(format!("{} queued twice", id));
            }
            let op = self.store.get(id).ok_or_else(|| format!("queued id {} not in store", id))?;
            if !op.is_pending() {
                return Err(format!("queued id {} has status {}", id, op.status));
            }
        }

        for op in self.store.values().filter(|op| op.is_pending()) {
            if !self.pending.contains(&op.id) {
                return Err(format!("pending operation {} missing from queue", op.id));
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::domain::{AnalysisMode, MemoId};
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Step {
        Register { memo: usize, kind: u8, mode: u8 },
        Complete(usize),
        Fail(usize),
        Cancel(usize),
        Start(usize),
        ProcessQueue,
        Capacity(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            4 => (0..3usize, 0..3u8, 0..2u8).prop_map(|(memo, kind, mode)| Step::Register { memo, kind, mode }),
            2 => (0..16usize).prop_map(Step::Complete),
            1 => (0..16usize).prop_map(Step::Fail),
            1 => (0..16usize).prop_map(Step::Cancel),
            1 => (0..16usize).prop_map(Step::Start),
            1 => Just(Step::ProcessQueue),
            1 => (1..4usize).prop_map(Step::Capacity),
        ]
    }

    fn kind_for(memo: MemoId, kind: u8, mode: u8) -> OperationKind {
        let mode = if mode == 0 { AnalysisMode::Themes } else { AnalysisMode::Todos };
        match kind {
            0 => OperationKind::recording(memo),
            1 => OperationKind::transcription(memo),
            _ => OperationKind::analysis(memo, mode),
        }
    }

    fn apply(state: &mut CoordinatorState, memos: &[MemoId], ids: &mut Vec<OperationId>, step: &Step) {
        let pick = |ids: &[OperationId], i: usize| ids.get(i % ids.len().max(1)).copied();
        match step {
            Step::Register { memo, kind, mode } => {
                if let Some(id) = state.register(kind_for(memos[*memo], *kind, *mode), None) {
                    ids.push(id);
                }
            }
            Step::Complete(i) => {
                if let Some(id) = pick(ids, *i) {
                    let _ = state.complete(id);
                }
            }
            Step::Fail(i) => {
                if let Some(id) = pick(ids, *i) {
                    let _ = state.fail(id, None);
                }
            }
            Step::Cancel(i) => {
                if let Some(id) = pick(ids, *i) {
                    let _ = state.cancel(id);
                }
            }
            Step::Start(i) => {
                if let Some(id) = pick(ids, *i) {
                    state.start(id);
                }
            }
            Step::ProcessQueue => {
                state.process_queue();
            }
            Step::Capacity(n) => state.capacity.set(*n),
        }
    }

    proptest! {
        #[test]
        fn prop_state_stays_consistent(steps in proptest::collection::vec(step(), 1..60)) {
            let mut state = CoordinatorState::new(ConflictPolicy::default(), CapacityLimit::new(2));
            let memos = [MemoId::new(), MemoId::new(), MemoId::new()];
            let mut ids = Vec::new();

            for step in &steps {
                apply(&mut state, &memos, &mut ids, step);
                prop_assert!(state.check_invariants().is_ok(), "{:?}", state.check_invariants());
                state.drain_notifications();
            }
        }

        #[test]
        fn prop_start_never_exceeds_capacity(steps in proptest::collection::vec(step(), 1..60)) {
            let mut state = CoordinatorState::new(ConflictPolicy::default(), CapacityLimit::new(2));
            let memos = [MemoId::new(), MemoId::new(), MemoId::new()];
            let mut ids = Vec::new();

            // Capacity stays fixed, so the bound holds after every step
            for step in steps.iter().filter(|s| !matches!(s, Step::Capacity(_))) {
                apply(&mut state, &memos, &mut ids, step);
                prop_assert!(state.store.active_count() <= 2);
                prop_assert!(state.stats.peak_active <= 2);
            }
        }

        #[test]
        fn prop_process_queue_is_idempotent(steps in proptest::collection::vec(step(), 1..60)) {
            let mut state = CoordinatorState::new(ConflictPolicy::default(), CapacityLimit::new(2));
            let memos = [MemoId::new(), MemoId::new(), MemoId::new()];
            let mut ids = Vec::new();

            for step in &steps {
                apply(&mut state, &memos, &mut ids, step);
            }

            state.process_queue();
            let snapshot = state.list_all();
            state.drain_notifications();

            prop_assert_eq!(state.process_queue(), 0);
            prop_assert_eq!(state.list_all(), snapshot);
            prop_assert!(state.drain_notifications().is_empty());
        }

        #[test]
        fn prop_pending_listed_in_queue_order(steps in proptest::collection::vec(step(), 1..60)) {
            let mut state = CoordinatorState::new(ConflictPolicy::default(), CapacityLimit::new(1));
            let memos = [MemoId::new(), MemoId::new(), MemoId::new()];
            let mut ids = Vec::new();

            for step in &steps {
                apply(&mut state, &memos, &mut ids, step);
            }

            let pending = state.list_pending();
            for pair in pending.windows(2) {
                prop_assert_ne!(pair[0].queue_order(&pair[1]), std::cmp::Ordering::Greater);
            }
        }
    }
}
