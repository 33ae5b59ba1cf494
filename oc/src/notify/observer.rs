//! Status observer interface

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{DEFAULT_FAILURE_REASON, DetailedStatus, MemoId, OperationId, OperationKind};

/// One status or progress change, as seen by the observer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub operation_id: OperationId,
    pub memo_id: MemoId,
    pub kind: OperationKind,
    /// `None` when the operation was just registered
    pub previous: Option<DetailedStatus>,
    pub current: DetailedStatus,
}

/// Generic error handed to [`StatusObserver::on_failure`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationError {
    message: String,
}

impl OperationError {
    /// Wrap a failure description, falling back to a generic message
    pub fn from_description(description: Option<&str>) -> Self {
        Self {
            message: description.unwrap_or(DEFAULT_FAILURE_REASON).to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Receives every status transition and progress update
///
/// The coordinator holds its observer weakly and awaits each call before
/// handling the next command. Implementations must not await calls back into
/// the coordinator inline; spawn them instead.
#[async_trait]
pub trait StatusObserver: Send + Sync {
    async fn on_status_update(&self, update: StatusUpdate);

    /// Called after the `completed` status update
    async fn on_complete(&self, _operation_id: OperationId, _memo_id: MemoId, _kind: OperationKind) {}

    /// Called after the `failed` status update
    async fn on_failure(
        &self,
        _operation_id: OperationId,
        _memo_id: MemoId,
        _kind: OperationKind,
        _error: OperationError,
    ) {
    }
}
