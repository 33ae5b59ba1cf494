//! Operation store and active index
//!
//! The store is the single source of truth for operation status. The active
//! index maps each memo to its active operation ids and is only changed by
//! `transition`, so an id is indexed exactly when its stored status is
//! `active`.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{MemoId, Operation, OperationId, OperationStatus};

use super::messages::{CoordResponse, CoordinatorError};

/// Operations keyed by id, plus the per-memo active index
#[derive(Debug, Default)]
pub(crate) struct OperationStore {
    operations: HashMap<OperationId, Operation>,
    active: HashMap<MemoId, BTreeSet<OperationId>>,
    active_count: usize,
}

fn action_for(next: OperationStatus) -> &'static str {
    match next {
        OperationStatus::Pending => "requeue",
        OperationStatus::Active => "start",
        OperationStatus::Completed => "complete",
        OperationStatus::Failed => "fail",
        OperationStatus::Cancelled => "cancel",
    }
}

impl OperationStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, id: &OperationId) -> Option<&Operation> {
        self.operations.get(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.operations.len()
    }

    /// Insert a freshly created operation; it must be pending
    pub(crate) fn insert(&mut self, op: Operation) {
        debug!(id = %op.id, kind = %op.kind, "OperationStore::insert: called");
        debug_assert!(op.is_pending(), "only pending operations are inserted");
        self.operations.insert(op.id, op);
    }

    /// Number of operations with status `active`
    pub(crate) fn active_count(&self) -> usize {
        self.active_count
    }

    /// Active operations of one memo, in id (creation) order
    pub(crate) fn active_for(&self, memo_id: &MemoId) -> impl Iterator<Item = &Operation> {
        self.active
            .get(memo_id)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.operations.get(id))
    }

    /// All active operations, in id order
    pub(crate) fn active(&self) -> Vec<&Operation> {
        let mut ops: Vec<&Operation> = self
            .active
            .values()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.operations.get(id))
            .collect();
        ops.sort_by_key(|op| op.id);
        ops
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    /// Move an operation to `next`, keeping the active index in step
    ///
    /// Returns the previous status.
    pub(crate) fn transition(
        &mut self,
        id: OperationId,
        next: OperationStatus,
        now: DateTime<Utc>,
    ) -> CoordResponse<OperationStatus> {
        let op = self
            .operations
            .get_mut(&id)
            .ok_or(CoordinatorError::UnknownOperation(id))?;
        let previous = op.status;
        if !op.transition(next, now) {
            return Err(CoordinatorError::InvalidTransition {
                id,
                from: previous,
                action: action_for(next),
            });
        }

        let memo_id = op.memo_id();
        if next == OperationStatus::Active {
            if self.active.entry(memo_id).or_default().insert(id) {
                self.active_count += 1;
            }
        } else if previous == OperationStatus::Active {
            if let Some(ids) = self.active.get_mut(&memo_id) {
                if ids.remove(&id) {
                    self.active_count -= 1;
                }
                if ids.is_empty() {
                    self.active.remove(&memo_id);
                }
            }
        }

        debug!(
            %id,
            from = %previous,
            to = %next,
            active_count = self.active_count,
            "OperationStore::transition: applied"
        );
        Ok(previous)
    }

    /// Record progress for an active operation
    pub(crate) fn set_progress(&mut self, id: OperationId, progress: f64) -> CoordResponse<bool> {
        let op = self
            .operations
            .get_mut(&id)
            .ok_or(CoordinatorError::UnknownOperation(id))?;
        Ok(op.set_progress(progress))
    }

    pub(crate) fn set_error(&mut self, id: OperationId, description: String) {
        if let Some(op) = self.operations.get_mut(&id) {
            op.error_description = Some(description);
        }
    }

    /// Drop a terminal record
    pub(crate) fn remove(&mut self, id: OperationId) -> CoordResponse<Operation> {
        let op = self
            .operations
            .get(&id)
            .ok_or(CoordinatorError::UnknownOperation(id))?;
        if !op.status.is_terminal() {
            return Err(CoordinatorError::InvalidTransition {
                id,
                from: op.status,
                action: "clear",
            });
        }
        self.operations
            .remove(&id)
            .ok_or(CoordinatorError::UnknownOperation(id))
    }

    /// Drop every terminal record, returning how many went
    pub(crate) fn remove_terminal(&mut self) -> usize {
        let before = self.operations.len();
        self.operations.retain(|_, op| !op.status.is_terminal());
        before - self.operations.len()
    }

    /// Verify the index agrees with the stored statuses
    pub(crate) fn check_consistency(&self) -> Result<(), String> {
        let mut indexed = 0;
        for (memo_id, ids) in &self.active {
            if ids.is_empty() {
                return Err(format!("empty active set left for memo {}", memo_id));
            }
            for id in ids {
                let op = self
                    .operations
                    .get(id)
                    .ok_or_else(|| format!("indexed id {} not in store", id))?;
                if !op.is_active() {
                    return Err(format!("indexed id {} has status {}", id, op.status));
                }
                if op.memo_id() != *memo_id {
                    return Err(format!("id {} indexed under wrong memo", id));
                }
                indexed += 1;
            }
        }

        let stored_active = self.operations.values().filter(|op| op.is_active()).count();
        if stored_active != indexed {
            return Err(format!("{} active in store, {} indexed", stored_active, indexed));
        }
        if self.active_count != indexed {
            return Err(format!("active_count {} but {} indexed", self.active_count, indexed));
        }
        Ok(())
    }
}
