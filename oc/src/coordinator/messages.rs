//! Coordinator messages
//!
//! Commands and responses for the actor pattern.

use std::sync::Weak;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{MemoId, Operation, OperationCategory, OperationId, OperationKind, OperationStatus, Priority};
use crate::notify::StatusObserver;

/// Errors from coordinator calls
///
/// Admission rejections and refused starts are not errors; they come back as
/// `Ok(None)` / `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(OperationId),

    #[error("Cannot {action} operation {id} while it is {from}")]
    InvalidTransition {
        id: OperationId,
        from: OperationStatus,
        action: &'static str,
    },

    #[error("Coordinator channel closed")]
    ChannelClosed,
}

/// Response from coordinator calls
pub type CoordResponse<T> = Result<T, CoordinatorError>;

/// Counters kept by the coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Operations stored (admitted or queued)
    pub registered: u64,
    /// Successful `pending -> active` transitions
    pub started: u64,
    /// Registrations that resolved to `queue`
    pub queued: u64,
    /// Registrations that resolved to `allow`
    pub allowed: u64,
    /// Existing operations cancelled by a `replace` resolution
    pub replaced: u64,
    pub rejected_capacity: u64,
    pub rejected_conflict: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Highest number of simultaneously active operations seen
    pub peak_active: usize,
    /// Active operations at snapshot time
    pub active: usize,
    /// Queued operations at snapshot time
    pub pending: usize,
}

/// Commands sent to the coordinator actor
#[derive(Debug)]
pub enum CoordCommand {
    Register {
        kind: OperationKind,
        priority: Option<Priority>,
        reply: oneshot::Sender<Option<OperationId>>,
    },
    Start {
        id: OperationId,
        reply: oneshot::Sender<bool>,
    },
    Get {
        id: OperationId,
        reply: oneshot::Sender<Option<Operation>>,
    },
    Cancel {
        id: OperationId,
        reply: oneshot::Sender<CoordResponse<bool>>,
    },
    Complete {
        id: OperationId,
        reply: oneshot::Sender<CoordResponse<()>>,
    },
    Fail {
        id: OperationId,
        description: Option<String>,
        reply: oneshot::Sender<CoordResponse<()>>,
    },
    UpdateProgress {
        id: OperationId,
        progress: f64,
        reply: oneshot::Sender<CoordResponse<bool>>,
    },
    ProcessQueue {
        reply: oneshot::Sender<usize>,
    },

    // Queries
    ListActive {
        reply: oneshot::Sender<Vec<Operation>>,
    },
    ListPending {
        reply: oneshot::Sender<Vec<Operation>>,
    },
    ListForMemo {
        memo_id: MemoId,
        reply: oneshot::Sender<Vec<Operation>>,
    },
    ListAll {
        reply: oneshot::Sender<Vec<Operation>>,
    },
    FindActive {
        memo_id: MemoId,
        category: OperationCategory,
        reply: oneshot::Sender<Option<Operation>>,
    },
    Stats {
        reply: oneshot::Sender<CoordinatorStats>,
    },

    // Retention
    Clear {
        id: OperationId,
        reply: oneshot::Sender<CoordResponse<Operation>>,
    },
    ClearFinished {
        reply: oneshot::Sender<usize>,
    },

    // Observer
    SetObserver {
        observer: Option<Weak<dyn StatusObserver>>,
        reply: oneshot::Sender<()>,
    },

    // Shutdown
    Shutdown,
}
