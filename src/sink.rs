//! Durable chat log and live-display delivery.
//!
//! # Storage structure
//!
//! ```text
//! ~/Documents/Twitch_Chats/
//!     foo.csv          # Username,Time,Message
//!     bar.csv
//! ```
//!
//! Each channel log is append-only: the header is written once when the file
//! is first created, and every event afterwards is a single appended row.
//! Prior content is never read back or rewritten, so the cost of a write does
//! not grow with the log and an interrupted write can damage at most the row
//! being written.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self as std_mpsc, TrySendError};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::channel::Channel;
use crate::constants::{LOG_HEADER, LOG_SUBDIR};
use crate::decoder::ChatEvent;

/// Default directory for chat logs: `<documents>/Twitch_Chats`.
///
/// Falls back to `~/Documents` when the platform has no documents directory
/// configured, and to the working directory when there is no home either.
pub fn default_log_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Documents")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(LOG_SUBDIR)
}

/// Path of a channel's log inside `log_dir`.
pub fn log_path(log_dir: &Path, channel: &Channel) -> PathBuf {
    log_dir.join(format!("{}.csv", channel.streamer()))
}

// ============================================================================
// Chat Log
// ============================================================================

/// Append-only CSV log for one channel.
///
/// The file is opened lazily on the first append and kept open afterwards.
#[derive(Debug)]
pub struct ChatLog {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

impl ChatLog {
    /// Create a log handle for `channel` under `log_dir`. No I/O happens
    /// until the first append.
    pub fn new(log_dir: &Path, channel: &Channel) -> Self {
        Self {
            path: log_path(log_dir, channel),
            writer: None,
        }
    }

    /// Path of the CSV file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one `{Username, Time, Message}` row and flush it.
    ///
    /// On failure the open writer is discarded so the next append reopens the
    /// file from scratch.
    pub fn append(&mut self, event: &ChatEvent) -> Result<()> {
        let result = self.write_row(event);
        if result.is_err() {
            self.writer = None;
        }
        result
    }

    fn write_row(&mut self, event: &ChatEvent) -> Result<()> {
        if self.writer.is_none() {
            self.writer = Some(self.open()?);
        }
        let Some(writer) = self.writer.as_mut() else {
            anyhow::bail!("chat log writer unavailable");
        };

        let time = event.formatted_time();
        writer
            .write_record([event.username.as_str(), time.as_str(), event.message.as_str()])
            .with_context(|| format!("Failed to write row to {}", self.path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(())
    }

    /// Open the file for appending, creating directory, file and header as
    /// needed.
    fn open(&self) -> Result<csv::Writer<File>> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open chat log {}", self.path.display()))?;
        let is_new = file
            .metadata()
            .with_context(|| format!("Failed to stat chat log {}", self.path.display()))?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer
                .write_record(LOG_HEADER)
                .context("Failed to write chat log header")?;
            writer.flush().context("Failed to flush chat log header")?;
            log::info!("[ChatLog] Created {}", self.path.display());
        } else {
            log::debug!("[ChatLog] Appending to {}", self.path.display());
        }

        Ok(writer)
    }
}

// ============================================================================
// Delivery Queue
// ============================================================================

/// Create a bounded delivery queue for live display.
///
/// A capacity of zero is raised to one so the queue can hold an event
/// without a consumer blocked on it.
pub fn delivery_queue(capacity: usize) -> (DeliveryQueue, DeliveryReceiver) {
    let (tx, rx) = std_mpsc::sync_channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        DeliveryQueue {
            tx,
            dropped: Arc::clone(&dropped),
        },
        DeliveryReceiver { rx, dropped },
    )
}

/// Producer side of the delivery queue. Never blocks.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: std_mpsc::SyncSender<ChatEvent>,
    dropped: Arc<AtomicU64>,
}

impl DeliveryQueue {
    /// Offer an event for display.
    ///
    /// Returns `false` if the queue is full or the consumer is gone; the
    /// event is then dropped for display only.
    pub fn offer(&self, event: ChatEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::debug!("[Delivery] Queue full, dropped event for display ({total} total)");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer side of the delivery queue.
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: std_mpsc::Receiver<ChatEvent>,
    dropped: Arc<AtomicU64>,
}

impl DeliveryReceiver {
    /// Take every queued event without blocking, oldest first.
    pub fn drain(&self) -> Vec<ChatEvent> {
        self.rx.try_iter().collect()
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Chat Sink
// ============================================================================

/// Destination for decoded events: the durable log, plus an optional
/// delivery queue.
#[derive(Debug)]
pub struct ChatSink {
    log: ChatLog,
    queue: Option<DeliveryQueue>,
    persisted: u64,
}

impl ChatSink {
    /// Sink writing to `channel`'s log under `log_dir`.
    pub fn new(log_dir: &Path, channel: &Channel) -> Self {
        Self {
            log: ChatLog::new(log_dir, channel),
            queue: None,
            persisted: 0,
        }
    }

    /// Also forward every event to `queue`.
    pub fn with_queue(mut self, queue: DeliveryQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Path of the underlying log file.
    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// Number of events written to the log so far.
    pub fn persisted(&self) -> u64 {
        self.persisted
    }

    /// Persist an event, then offer it for display.
    ///
    /// A write failure is logged and the event is lost from the log; it is
    /// not fatal to the caller and display forwarding still happens.
    pub fn persist(&mut self, event: ChatEvent) {
        match self.log.append(&event) {
            Ok(()) => self.persisted += 1,
            Err(e) => log::error!("[ChatLog] Dropping message from {}: {e:#}", event.username),
        }
        if let Some(queue) = &self.queue {
            queue.offer(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use tempfile::TempDir;

    fn foo() -> Channel {
        Channel::new("foo").unwrap()
    }

    fn event(user: &str, text: &str) -> ChatEvent {
        decode(&foo(), &format!(":{user}!{user}@{user} PRIVMSG #foo :{text}")).unwrap()
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_log_path_uses_streamer_name() {
        let path = log_path(Path::new("/logs"), &Channel::new("#Foo").unwrap());
        assert_eq!(path, PathBuf::from("/logs/foo.csv"));
    }

    #[test]
    fn test_default_log_dir_ends_with_subdir() {
        assert!(default_log_dir().ends_with(LOG_SUBDIR));
    }

    #[test]
    fn test_append_creates_directory_and_header() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested/chats");
        let mut log = ChatLog::new(&dir, &foo());

        log.append(&event("alice", "hello world")).unwrap();

        let rows = read_rows(log.path());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["Username", "Time", "Message"]);
        assert_eq!(rows[1][0], "alice");
        assert_eq!(rows[1][2], "hello world");
    }

    #[test]
    fn test_rows_keep_arrival_order() {
        let temp = TempDir::new().unwrap();
        let mut log = ChatLog::new(temp.path(), &foo());
        for i in 0..25 {
            log.append(&event("user", &format!("message {i}"))).unwrap();
        }

        let rows = read_rows(log.path());
        assert_eq!(rows.len(), 26);
        for (i, row) in rows[1..].iter().enumerate() {
            assert_eq!(row[2], format!("message {i}"));
        }
    }

    #[test]
    fn test_header_written_once_across_runs() {
        let temp = TempDir::new().unwrap();

        let mut first = ChatLog::new(temp.path(), &foo());
        first.append(&event("alice", "run one")).unwrap();
        drop(first);

        let mut second = ChatLog::new(temp.path(), &foo());
        second.append(&event("bob", "run two")).unwrap();

        let content = fs::read_to_string(second.path()).unwrap();
        assert_eq!(content.matches("Username,Time,Message").count(), 1);

        let rows = read_rows(second.path());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][2], "run one");
        assert_eq!(rows[2][2], "run two");
    }

    #[test]
    fn test_embedded_delimiters_are_quoted() {
        let temp = TempDir::new().unwrap();
        let mut log = ChatLog::new(temp.path(), &foo());
        log.append(&event("carol", "a, b and \"c\"")).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("\"a, b and \"\"c\"\"\""));
        assert_eq!(read_rows(log.path())[1][2], "a, b and \"c\"");
    }

    #[test]
    fn test_append_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        // A regular file where the log directory should be
        let blocker = temp.path().join("blocked");
        fs::write(&blocker, "not a directory").unwrap();

        let mut log = ChatLog::new(&blocker, &foo());
        assert!(log.append(&event("alice", "lost")).is_err());
    }

    #[test]
    fn test_queue_drops_when_full() {
        let (queue, receiver) = delivery_queue(2);
        assert!(queue.offer(event("a", "1")));
        assert!(queue.offer(event("b", "2")));
        assert!(!queue.offer(event("c", "3")));
        assert_eq!(receiver.dropped(), 1);

        let drained = receiver.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "1");
        assert_eq!(drained[1].message, "2");
        assert!(receiver.drain().is_empty());
    }

    #[test]
    fn test_queue_zero_capacity_still_buffers() {
        let (queue, receiver) = delivery_queue(0);
        assert!(queue.offer(event("a", "1")));
        assert_eq!(receiver.drain().len(), 1);
    }

    #[test]
    fn test_queue_without_consumer() {
        let (queue, receiver) = delivery_queue(4);
        drop(receiver);
        assert!(!queue.offer(event("a", "1")));
    }

    #[test]
    fn test_sink_persists_and_forwards() {
        let temp = TempDir::new().unwrap();
        let (queue, receiver) = delivery_queue(8);
        let mut sink = ChatSink::new(temp.path(), &foo()).with_queue(queue);

        sink.persist(event("alice", "hi"));
        sink.persist(event("bob", "yo"));

        assert_eq!(sink.persisted(), 2);
        assert_eq!(read_rows(sink.log_path()).len(), 3);
        let shown: Vec<_> = receiver.drain().into_iter().map(|e| e.username).collect();
        assert_eq!(shown, vec!["alice", "bob"]);
    }

    #[test]
    fn test_sink_forwards_even_when_log_fails() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocked");
        fs::write(&blocker, "").unwrap();
        let (queue, receiver) = delivery_queue(8);
        let mut sink = ChatSink::new(&blocker, &foo()).with_queue(queue);

        sink.persist(event("alice", "hi"));

        assert_eq!(sink.persisted(), 0);
        assert_eq!(receiver.drain().len(), 1);
    }
}
