//! Domain types for coordinated operations
//!
//! - `Operation` - a tracked unit of work and its lifecycle status
//! - `OperationKind` - what is being done, and to which memo
//! - `DetailedStatus` - the observer-facing projection of an operation
//! - `Priority` - queue priority

mod id;
mod kind;
mod operation;
mod priority;
mod status;

pub use id::{MemoId, OperationId};
pub use kind::{AnalysisMode, OperationCategory, OperationKind};
pub use operation::{Operation, OperationStatus};
pub use priority::Priority;
pub use status::{DEFAULT_FAILURE_REASON, DetailedStatus};
