//! Coarse event channel
//!
//! The coordinator publishes a narrow set of application-wide events
//! (recording started/completed/stopped, transcription and analysis
//! completed) through an [`EventPublisher`]. The default publisher is the
//! broadcast [`EventBus`]; the [`EventLogger`] can subscribe to it and keep a
//! per-memo JSONL history.
//!
//! ```rust,ignore
//! let bus = create_event_bus(DEFAULT_CHANNEL_CAPACITY);
//! let mut rx = bus.subscribe();
//! let coordinator = Coordinator::spawn(config, policy, bus.clone());
//! while let Ok(event) = rx.recv().await {
//!     println!("{} for memo {}", event.event_type(), event.memo_id());
//! }
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventPublisher, create_event_bus};
pub use logger::{EventLogger, read_memo_events, spawn_event_logger};
pub use types::{CoordEvent, EventLogEntry};
