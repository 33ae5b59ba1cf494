//! Event Logger - persists coarse events to JSONL files
//!
//! Subscribes to the EventBus and appends every event to a per-memo file,
//! `{events_dir}/{memo-id}/events.jsonl`, for history and debugging.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use eyre::Context;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::domain::MemoId;

use super::bus::EventBus;
use super::types::{CoordEvent, EventLogEntry};

/// Event logger that writes events to JSONL files
pub struct EventLogger {
    events_dir: PathBuf,
    /// Open file writers per memo
    writers: HashMap<MemoId, BufWriter<File>>,
}

impl EventLogger {
    /// Create a new event logger rooted at `events_dir`
    pub fn new(events_dir: impl AsRef<Path>) -> Self {
        let events_dir = events_dir.as_ref().to_path_buf();
        debug!(?events_dir, "EventLogger::new: creating logger");
        Self {
            events_dir,
            writers: HashMap::new(),
        }
    }

    /// Create a logger under the local data dir (`~/.local/share/opcoord/events`)
    pub fn with_default_path() -> eyre::Result<Self> {
        let data_dir = dirs::data_local_dir().ok_or_else(|| eyre::eyre!("Could not determine data directory"))?;
        let events_dir = data_dir.join("opcoord").join("events");
        fs::create_dir_all(&events_dir).context("Failed to create events directory")?;
        Ok(Self::new(events_dir))
    }

    /// Write an event to its memo's log file
    pub fn write_event(&mut self, event: &CoordEvent) -> eyre::Result<()> {
        let memo_id = event.memo_id();
        debug!(%memo_id, event_type = event.event_type(), "EventLogger::write_event");

        let writer = match self.writers.entry(memo_id) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let memo_dir = self.events_dir.join(memo_id.to_string());
                fs::create_dir_all(&memo_dir)?;

                let log_path = memo_dir.join("events.jsonl");
                debug!(?log_path, "EventLogger: creating new log file");

                let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
                entry.insert(BufWriter::new(file))
            }
        };

        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Write an event, closing the memo's file once an operation finishes
    ///
    /// A later event for the same memo reopens the file in append mode, so
    /// only memos with work in flight keep a writer open.
    pub fn log(&mut self, event: &CoordEvent) -> eyre::Result<()> {
        let result = self.write_event(event);
        if event.ends_operation() {
            self.close_memo(&event.memo_id());
        }
        result
    }

    /// Close the writer for a memo
    pub fn close_memo(&mut self, memo_id: &MemoId) {
        debug!(%memo_id, "EventLogger::close_memo");
        if let Some(mut writer) = self.writers.remove(memo_id) {
            let _ = writer.flush();
        }
    }

    /// Consume events from `rx` until the bus is dropped
    ///
    /// Meant to be spawned as a background task. Take the receiver before
    /// spawning so no early events are missed.
    pub async fn run(mut self, mut rx: broadcast::Receiver<CoordEvent>) {
        debug!("EventLogger::run: starting event logger");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.log(&event) {
                        error!(memo_id = %event.memo_id(), error = %e, "EventLogger: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (memo_id, mut writer) in self.writers.drain() {
            debug!(%memo_id, "EventLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

/// Read events from a memo's log file
pub fn read_memo_events(events_dir: impl AsRef<Path>, memo_id: &MemoId) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = events_dir.as_ref().join(memo_id.to_string()).join("events.jsonl");
    debug!(?log_path, "read_memo_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_memo_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_memo_events: loaded entries");
    Ok(entries)
}

/// Spawn an event logger writing under `events_dir`
pub fn spawn_event_logger(event_bus: &EventBus, events_dir: impl AsRef<Path>) -> tokio::task::JoinHandle<()> {
    let logger = EventLogger::new(events_dir);
    let rx = event_bus.subscribe();
    tokio::spawn(logger.run(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OperationId;
    use tempfile::tempdir;

    fn started(memo_id: MemoId) -> CoordEvent {
        CoordEvent::RecordingStarted {
            memo_id,
            operation_id: OperationId::new(),
        }
    }

    #[test]
    fn test_write_event() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());
        let memo = MemoId::new();

        logger.write_event(&started(memo)).unwrap();

        let log_path = temp.path().join(memo.to_string()).join("events.jsonl");
        assert!(log_path.exists());
        let content = fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("RecordingStarted"));
        assert!(content.contains(&memo.to_string()));
    }

    #[test]
    fn test_read_memo_events_in_order() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());
        let memo = MemoId::new();
        let other = MemoId::new();

        logger.write_event(&started(memo)).unwrap();
        logger.write_event(&started(other)).unwrap();
        logger
            .write_event(&CoordEvent::RecordingCompleted {
                memo_id: memo,
                operation_id: OperationId::new(),
            })
            .unwrap();

        let entries = read_memo_events(temp.path(), &memo).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event.event_type(), "RecordingStarted");
        assert_eq!(entries[1].event.event_type(), "RecordingCompleted");
        assert_eq!(read_memo_events(temp.path(), &other).unwrap().len(), 1);
    }

    #[test]
    fn test_read_nonexistent_memo() {
        let temp = tempdir().unwrap();
        let entries = read_memo_events(temp.path(), &MemoId::new()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_close_memo() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());
        let memo = MemoId::new();

        logger.write_event(&started(memo)).unwrap();
        assert!(logger.writers.contains_key(&memo));
        logger.close_memo(&memo);
        assert!(!logger.writers.contains_key(&memo));
    }

    #[tokio::test]
    async fn test_spawned_logger_drains_bus() {
        let temp = tempdir().unwrap();
        let bus = EventBus::new(16);
        let memo = MemoId::new();

        let handle = spawn_event_logger(&bus, temp.path());
        bus.emit(started(memo));
        drop(bus);
        handle.await.unwrap();

        let entries = read_memo_events(temp.path(), &memo).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_finished_memos_release_their_writers() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());
        let memos: Vec<_> = (0..200).map(|_| MemoId::new()).collect();

        for memo in &memos {
            let operation_id = OperationId::new();
            logger
                .log(&CoordEvent::RecordingStarted {
                    memo_id: *memo,
                    operation_id,
                })
                .unwrap();
            assert!(logger.writers.contains_key(memo));
            logger
                .log(&CoordEvent::RecordingCompleted {
                    memo_id: *memo,
                    operation_id,
                })
                .unwrap();
        }
        assert!(logger.writers.is_empty());

        // Reopening appends rather than truncating
        logger.log(&started(memos[0])).unwrap();
        assert_eq!(logger.writers.len(), 1);
        assert_eq!(read_memo_events(temp.path(), &memos[0]).unwrap().len(), 3);
    }
}
