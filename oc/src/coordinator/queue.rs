//! Pending queue and promotion
//!
//! The queue holds ids of stored `pending` operations. Promotion order is
//! priority descending, then registration time, then sequence; it is
//! recomputed from the stored operations on every pass rather than kept in a
//! heap, since priorities never change and the queue is short.

use tracing::{debug, info};

use crate::domain::{Operation, OperationId};

use super::state::CoordinatorState;

/// Ids waiting to start, in arrival order
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    ids: Vec<OperationId>,
}

impl PendingQueue {
    /// Append an id; false if it was already queued
    pub(crate) fn push(&mut self, id: OperationId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub(crate) fn remove(&mut self, id: &OperationId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|queued| queued != id);
        self.ids.len() != before
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&OperationId) -> bool) {
        self.ids.retain(keep);
    }

    pub(crate) fn contains(&self, id: &OperationId) -> bool {
        self.ids.contains(id)
    }

    pub(crate) fn ids(&self) -> &[OperationId] {
        &self.ids
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}

impl CoordinatorState {
    /// Start every queued operation that can start, in queue order
    ///
    /// A single pass: a candidate that is still blocked stays queued and the
    /// next one is tried. Returns how many were started. Running it twice
    /// with nothing changed in between starts nothing the second time.
    pub(crate) fn process_queue(&mut self) -> usize {
        let store = &self.store;
        self.pending
            .retain(|id| store.get(id).is_some_and(Operation::is_pending));

        let mut candidates: Vec<&Operation> = self
            .pending
            .ids()
            .iter()
            .filter_map(|id| self.store.get(id))
            .collect();
        candidates.sort_by(|a, b| a.queue_order(b));
        let order: Vec<OperationId> = candidates.into_iter().map(|op| op.id).collect();

        debug!(queued = order.len(), "CoordinatorState::process_queue: called");

        let mut started = 0;
        for id in order {
            if self.start(id) {
                started += 1;
            }
        }

        if started > 0 {
            info!(started, remaining = self.pending.len(), "Promoted queued operations");
        }
        started
    }
}
