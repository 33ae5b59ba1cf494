//! Coarse application-wide events
//!
//! A deliberately narrow vocabulary: only the category/status combinations
//! that cross-cutting consumers (live-activity widgets, history logs) care
//! about. Per-operation progress goes to the status observer instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AnalysisMode, MemoId, Operation, OperationId, OperationKind, OperationStatus};

/// Event published on the event bus
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoordEvent {
    /// A recording became active
    RecordingStarted { memo_id: MemoId, operation_id: OperationId },
    /// A recording finished successfully
    RecordingCompleted { memo_id: MemoId, operation_id: OperationId },
    /// A recording ended without completing (failed or cancelled)
    RecordingStopped {
        memo_id: MemoId,
        operation_id: OperationId,
        reason: String,
    },
    TranscriptionCompleted { memo_id: MemoId, operation_id: OperationId },
    AnalysisCompleted {
        memo_id: MemoId,
        operation_id: OperationId,
        mode: AnalysisMode,
    },
}

impl CoordEvent {
    /// Coarse event for an operation's current status, if any
    pub fn for_operation(op: &Operation) -> Option<Self> {
        let memo_id = op.memo_id();
        let operation_id = op.id;
        match (op.kind, op.status) {
            (OperationKind::Recording { .. }, OperationStatus::Active) => Some(Self::RecordingStarted {
                memo_id,
                operation_id,
            }),
            (OperationKind::Recording { .. }, OperationStatus::Completed) => Some(Self::RecordingCompleted {
                memo_id,
                operation_id,
            }),
            (OperationKind::Recording { .. }, OperationStatus::Failed) => Some(Self::RecordingStopped {
                memo_id,
                operation_id,
                reason: op
                    .error_description
                    .clone()
                    .unwrap_or_else(|| "failed".to_string()),
            }),
            (OperationKind::Recording { .. }, OperationStatus::Cancelled) => Some(Self::RecordingStopped {
                memo_id,
                operation_id,
                reason: "cancelled".to_string(),
            }),
            (OperationKind::Transcription { .. }, OperationStatus::Completed) => Some(Self::TranscriptionCompleted {
                memo_id,
                operation_id,
            }),
            (OperationKind::Analysis { mode, .. }, OperationStatus::Completed) => Some(Self::AnalysisCompleted {
                memo_id,
                operation_id,
                mode,
            }),
            _ => None,
        }
    }

    /// Memo the event is keyed by
    pub fn memo_id(&self) -> MemoId {
        match self {
            Self::RecordingStarted { memo_id, .. }
            | Self::RecordingCompleted { memo_id, .. }
            | Self::RecordingStopped { memo_id, .. }
            | Self::TranscriptionCompleted { memo_id, .. }
            | Self::AnalysisCompleted { memo_id, .. } => *memo_id,
        }
    }

    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::RecordingStarted { operation_id, .. }
            | Self::RecordingCompleted { operation_id, .. }
            | Self::RecordingStopped { operation_id, .. }
            | Self::TranscriptionCompleted { operation_id, .. }
            | Self::AnalysisCompleted { operation_id, .. } => *operation_id,
        }
    }

    /// True for events that finish an operation
    pub fn ends_operation(&self) -> bool {
        !matches!(self, Self::RecordingStarted { .. })
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RecordingStarted { .. } => "RecordingStarted",
            Self::RecordingCompleted { .. } => "RecordingCompleted",
            Self::RecordingStopped { .. } => "RecordingStopped",
            Self::TranscriptionCompleted { .. } => "TranscriptionCompleted",
            Self::AnalysisCompleted { .. } => "AnalysisCompleted",
        }
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: CoordEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: CoordEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;

    fn op_with(kind: OperationKind, path: &[OperationStatus]) -> Operation {
        let mut op = Operation::new(kind, Priority::Medium, 0);
        for status in path {
            assert!(op.transition(*status, Utc::now()));
        }
        op
    }

    #[test]
    fn test_recording_lifecycle_events() {
        let memo = MemoId::new();
        let started = op_with(OperationKind::recording(memo), &[OperationStatus::Active]);
        assert_eq!(
            CoordEvent::for_operation(&started),
            Some(CoordEvent::RecordingStarted {
                memo_id: memo,
                operation_id: started.id
            })
        );

        let done = op_with(
            OperationKind::recording(memo),
            &[OperationStatus::Active, OperationStatus::Completed],
        );
        assert_eq!(CoordEvent::for_operation(&done).unwrap().event_type(), "RecordingCompleted");

        let cancelled = op_with(
            OperationKind::recording(memo),
            &[OperationStatus::Active, OperationStatus::Cancelled],
        );
        match CoordEvent::for_operation(&cancelled) {
            Some(CoordEvent::RecordingStopped { reason, .. }) => assert_eq!(reason, "cancelled"),
            other => panic!("Expected RecordingStopped, got {:?}", other),
        }
    }

    #[test]
    fn test_narrow_channel() {
        let memo = MemoId::new();
        // Pending anything, active transcription/analysis: no coarse event
        assert!(CoordEvent::for_operation(&op_with(OperationKind::recording(memo), &[])).is_none());
        assert!(
            CoordEvent::for_operation(&op_with(OperationKind::transcription(memo), &[OperationStatus::Active]))
                .is_none()
        );
        assert!(
            CoordEvent::for_operation(&op_with(
                OperationKind::analysis(memo, AnalysisMode::Themes),
                &[OperationStatus::Active, OperationStatus::Failed]
            ))
            .is_none()
        );
    }

    #[test]
    fn test_analysis_completed_carries_mode() {
        let memo = MemoId::new();
        let op = op_with(
            OperationKind::analysis(memo, AnalysisMode::Todos),
            &[OperationStatus::Active, OperationStatus::Completed],
        );
        let event = CoordEvent::for_operation(&op).unwrap();
        assert_eq!(event.memo_id(), memo);
        assert_eq!(event.operation_id(), op.id);
        match event {
            CoordEvent::AnalysisCompleted { mode, .. } => assert_eq!(mode, AnalysisMode::Todos),
            other => panic!("Expected AnalysisCompleted, got {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let memo = MemoId::new();
        let event = CoordEvent::TranscriptionCompleted {
            memo_id: memo,
            operation_id: OperationId::new(),
        };
        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"]["type"], "TranscriptionCompleted");
        assert!(json.get("ts").is_some());

        let back: EventLogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.event, event);
    }
}
