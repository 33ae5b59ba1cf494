//! Admission control
//!
//! Registration runs the capacity gate first, then evaluates the conflict
//! policy against the active operations of the proposal's memo and applies
//! the most restrictive resulting strategy.

use tracing::{debug, info, warn};

use crate::domain::{Operation, OperationId, OperationKind, OperationStatus, Priority};
use crate::policy::{ResolutionStrategy, strongest};

use super::state::CoordinatorState;

impl CoordinatorState {
    /// Admit, queue, replace or reject a new operation
    ///
    /// Returns the new id, or `None` when the request was rejected (capacity
    /// reached, or a `cancel` conflict). Rejected requests store nothing.
    pub(crate) fn register(&mut self, kind: OperationKind, priority: Option<Priority>) -> Option<OperationId> {
        let priority = priority.unwrap_or_else(|| kind.default_priority());
        debug!(%kind, %priority, "CoordinatorState::register: called");

        let active = self.store.active_count();
        let limit = self.capacity.current();
        if active >= limit {
            self.stats.rejected_capacity += 1;
            warn!(%kind, active, limit, "Registration rejected: at capacity");
            return None;
        }

        let conflicts = self.conflicts_for(&kind);
        match strongest(&conflicts) {
            None => {
                let id = self.admit(kind, priority);
                info!(%id, %kind, %priority, "Operation admitted");
                self.start_or_enqueue(id);
                Some(id)
            }
            Some(ResolutionStrategy::Allow) => {
                let id = self.admit(kind, priority);
                self.stats.allowed += 1;
                info!(%id, %kind, compatible = conflicts.len(), "Operation allowed alongside active operations");
                self.start_or_enqueue(id);
                Some(id)
            }
            Some(ResolutionStrategy::Cancel) => {
                self.stats.rejected_conflict += 1;
                if let Some(conflict) = conflicts
                    .iter()
                    .find(|c| c.strategy == ResolutionStrategy::Cancel)
                {
                    warn!(
                        %kind,
                        existing = %conflict.existing_id,
                        existing_kind = %conflict.existing_kind,
                        "Registration rejected: conflicts with active operation"
                    );
                }
                None
            }
            Some(ResolutionStrategy::Queue) => {
                let id = self.admit(kind, priority);
                self.stats.queued += 1;
                self.pending.push(id);
                info!(
                    %id,
                    %kind,
                    %priority,
                    blocking = conflicts.len(),
                    queued = self.pending.len(),
                    "Operation queued"
                );
                Some(id)
            }
            Some(ResolutionStrategy::Replace) => {
                for conflict in conflicts
                    .iter()
                    .filter(|c| c.strategy == ResolutionStrategy::Replace)
                {
                    match self.finish(conflict.existing_id, OperationStatus::Cancelled, None, false) {
                        Ok(()) => {
                            self.stats.replaced += 1;
                            info!(
                                replaced = %conflict.existing_id,
                                replaced_kind = %conflict.existing_kind,
                                %kind,
                                "Replacing active operation"
                            );
                        }
                        Err(e) => {
                            warn!(replaced = %conflict.existing_id, error = %e, "Could not cancel replaced operation");
                        }
                    }
                }

                let id = self.admit(kind, priority);
                info!(%id, %kind, %priority, "Operation admitted as replacement");
                self.start_or_enqueue(id);
                self.process_queue();
                Some(id)
            }
        }
    }

    /// Store a new pending operation and record its registration
    fn admit(&mut self, kind: OperationKind, priority: Priority) -> OperationId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let op = Operation::new(kind, priority, sequence);
        let id = op.id;
        self.store.insert(op);
        self.stats.registered += 1;
        self.record(id, None);
        id
    }

    /// Start now, or wait in the queue if that is refused
    fn start_or_enqueue(&mut self, id: OperationId) {
        if !self.start(id) {
            self.pending.push(id);
            debug!(%id, queued = self.pending.len(), "CoordinatorState::start_or_enqueue: waiting in queue");
        }
    }
}
