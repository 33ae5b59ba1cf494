//! Operation coordinator
//!
//! Admission control, conflict resolution, lifecycle transitions and queue
//! promotion for memo operations, serialized through a single actor.
//!
//! ```rust,ignore
//! let bus = create_event_bus(DEFAULT_CHANNEL_CAPACITY);
//! let coordinator = Coordinator::spawn(&CoordinatorConfig::default(), ConflictPolicy::default(), bus);
//!
//! if let Some(id) = coordinator.register(OperationKind::recording(memo_id)).await? {
//!     // ... run the recording ...
//!     coordinator.complete(id).await?;
//! }
//! ```

mod admission;
mod capacity;
mod config;
mod handle;
mod messages;
mod queue;
mod state;
mod store;

pub use capacity::CapacityLimit;
pub use config::CoordinatorConfig;
pub use handle::Coordinator;
pub use messages::{CoordCommand, CoordResponse, CoordinatorError, CoordinatorStats};
