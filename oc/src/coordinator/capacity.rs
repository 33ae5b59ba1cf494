//! Live capacity limit
//!
//! The maximum number of simultaneously active operations. Read at every
//! admission and start, and changeable while the coordinator runs; the actor
//! watches it and re-runs the queue when it changes.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

/// Shared handle to the current capacity limit
#[derive(Debug, Clone)]
pub struct CapacityLimit {
    tx: Arc<watch::Sender<usize>>,
}

impl CapacityLimit {
    pub fn new(max_concurrent: usize) -> Self {
        debug!(max_concurrent, "CapacityLimit::new: called");
        let (tx, _rx) = watch::channel(max_concurrent);
        Self { tx: Arc::new(tx) }
    }

    /// Current maximum number of active operations
    pub fn current(&self) -> usize {
        *self.tx.borrow()
    }

    /// Change the limit; takes effect at the next admission or start
    pub fn set(&self, max_concurrent: usize) {
        let previous = self.tx.send_replace(max_concurrent);
        info!(previous, max_concurrent, "Capacity limit changed");
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }
}
