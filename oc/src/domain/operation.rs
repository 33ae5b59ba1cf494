//! Operation domain type
//!
//! Tracks one unit of work the coordinator admitted. Only the coordinator
//! mutates operations; callers receive clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::id::{MemoId, OperationId};
use super::kind::{OperationCategory, OperationKind};
use super::priority::Priority;
use super::status::DetailedStatus;

/// Lifecycle status of an operation
///
/// `pending -> active -> {completed | failed | cancelled}`, plus the direct
/// `pending -> cancelled` and `pending -> failed` edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Stored, waiting to start
    #[default]
    Pending,
    /// Holding a capacity slot
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// True once the operation can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine permits `self -> next`
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Active, Completed)
                | (Active, Failed)
                | (Active, Cancelled)
        )
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A tracked unit of work against one memo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identifier, never reused
    pub id: OperationId,

    /// Category, payload and target memo
    pub kind: OperationKind,

    /// Current status
    pub status: OperationStatus,

    /// Queue priority, fixed at creation
    pub priority: Priority,

    /// Registration time
    pub created_at: DateTime<Utc>,

    /// Registration order; breaks `created_at` ties in the queue
    pub sequence: u64,

    /// Set on `pending -> active`
    pub started_at: Option<DateTime<Utc>>,

    /// Set when the operation reaches a terminal status
    pub finished_at: Option<DateTime<Utc>>,

    /// Last reported progress (0.0..=1.0), only while active
    pub progress: Option<f64>,

    /// Failure description, only when failed
    pub error_description: Option<String>,
}

impl Operation {
    /// Create a pending operation
    pub fn new(kind: OperationKind, priority: Priority, sequence: u64) -> Self {
        debug!(%kind, %priority, sequence, "Operation::new: called");
        Self {
            id: OperationId::new(),
            kind,
            status: OperationStatus::Pending,
            priority,
            created_at: Utc::now(),
            sequence,
            started_at: None,
            finished_at: None,
            progress: None,
            error_description: None,
        }
    }

    pub fn memo_id(&self) -> MemoId {
        self.kind.memo_id()
    }

    pub fn category(&self) -> OperationCategory {
        self.kind.category()
    }

    pub fn description(&self) -> String {
        self.kind.description()
    }

    pub fn is_active(&self) -> bool {
        self.status == OperationStatus::Active
    }

    pub fn is_pending(&self) -> bool {
        self.status == OperationStatus::Pending
    }

    /// Observer-facing projection of `status` plus timing/progress metadata
    pub fn detailed_status(&self) -> DetailedStatus {
        DetailedStatus::of(self)
    }

    /// Queue order: priority descending, then arrival ascending
    pub fn queue_order(&self, other: &Self) -> std::cmp::Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }

    /// Apply a status transition, stamping timestamps
    ///
    /// Returns false (and leaves the operation untouched) if the state
    /// machine does not allow it.
    pub(crate) fn transition(&mut self, next: OperationStatus, now: DateTime<Utc>) -> bool {
        debug!(id = %self.id, from = %self.status, to = %next, "Operation::transition: called");
        if !self.status.can_transition_to(next) {
            debug!(id = %self.id, from = %self.status, to = %next, "Operation::transition: refused");
            return false;
        }

        match next {
            OperationStatus::Active => {
                self.started_at = Some(now);
            }
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled => {
                self.finished_at = Some(now);
            }
            OperationStatus::Pending => {}
        }
        self.status = next;
        true
    }

    /// Record progress; ignored unless active
    pub(crate) fn set_progress(&mut self, progress: f64) -> bool {
        if !self.is_active() {
            debug!(id = %self.id, status = %self.status, "Operation::set_progress: not active, ignoring");
            return false;
        }
        let clamped = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
        self.progress = Some(clamped);
        true
    }
}
