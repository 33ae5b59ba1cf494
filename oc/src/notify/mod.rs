//! Status notifications
//!
//! Every registration, transition and progress update is recorded by the
//! coordinator as a [`Notification`] and handed to the
//! [`NotificationDispatcher`], which informs the optional [`StatusObserver`]
//! and publishes the matching coarse event, if any.

mod dispatcher;
mod observer;

pub use dispatcher::{Notification, NotificationDispatcher};
pub use observer::{OperationError, StatusObserver, StatusUpdate};
