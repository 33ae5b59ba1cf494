//! opcoord - operation coordinator for voice memos
//!
//! Decides whether a recording, transcription or analysis of a memo may run
//! now, must wait, replaces something already running, or is refused, and
//! keeps observers informed as operations move through their lifecycle.
//!
//! # Core Concepts
//!
//! - **Admission**: a capacity gate, then a conflict policy scoped to the memo
//! - **Resolution strategies**: queue, cancel, replace or allow
//! - **Single owner**: all state lives in one actor task; calls never interleave
//! - **Queue promotion**: priority first, then arrival order
//!
//! # Modules
//!
//! - [`domain`] - Operations, kinds, priorities and status projections
//! - [`policy`] - Conflict rules and resolution strategies
//! - [`coordinator`] - The actor and its async handle
//! - [`notify`] - Status observer and notification dispatch
//! - [`events`] - Coarse event bus and JSONL event log
//! - [`config`] - Configuration types and loading
//! - [`cli`] / [`simulate`] - The `oc` binary's commands

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod events;
pub mod notify;
pub mod policy;
pub mod simulate;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{CapacityLimit, Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorStats, CoordResponse};
pub use domain::{
    AnalysisMode, DetailedStatus, MemoId, Operation, OperationCategory, OperationId, OperationKind, OperationStatus,
    Priority,
};
pub use events::{CoordEvent, EventBus, EventPublisher, create_event_bus};
pub use notify::{OperationError, StatusObserver, StatusUpdate};
pub use policy::{ConflictPolicy, OperationConflict, PolicyRule, ResolutionStrategy, RuleCondition};
