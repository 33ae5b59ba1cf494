//! Detailed status projection
//!
//! Derived from `Operation::status` plus its progress, timestamps and error
//! description each time an observer is notified. Never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::{Operation, OperationStatus};

/// Reason reported for failures that carry no description
pub const DEFAULT_FAILURE_REASON: &str = "operation failed";

/// Observer-facing view of an operation's status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DetailedStatus {
    /// Waiting in the queue (or about to start)
    Queued,
    /// Running, with the last reported progress
    Processing { progress: Option<f64> },
    Completed { at: DateTime<Utc> },
    Failed { reason: String, at: DateTime<Utc> },
    Cancelled { at: DateTime<Utc> },
}

impl DetailedStatus {
    /// Project an operation's current state
    pub fn of(op: &Operation) -> Self {
        let finished_at = op.finished_at.unwrap_or(op.created_at);
        match op.status {
            OperationStatus::Pending => Self::Queued,
            OperationStatus::Active => Self::Processing { progress: op.progress },
            OperationStatus::Completed => Self::Completed { at: finished_at },
            OperationStatus::Failed => Self::Failed {
                reason: op
                    .error_description
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
                at: finished_at,
            },
            OperationStatus::Cancelled => Self::Cancelled { at: finished_at },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. })
    }

    /// Short label for tables and logs
    pub fn label(&self) -> String {
        match self {
            Self::Queued => "queued".to_string(),
            Self::Processing { progress: Some(p) } => format!("processing {:.0}%", p * 100.0),
            Self::Processing { progress: None } => "processing".to_string(),
            Self::Completed { .. } => "completed".to_string(),
            Self::Failed { reason, .. } => format!("failed: {}", reason),
            Self::Cancelled { .. } => "cancelled".to_string(),
        }
    }
}

impl std::fmt::Display for DetailedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
