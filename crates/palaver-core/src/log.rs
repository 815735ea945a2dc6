//! Append-only message log.
//!
//! The log is the single source of truth for message ordering. Writers
//! go through [`crate::hub::ChatHub`]; readers query by index offset.

use crate::message::Message;
use chrono::Utc;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// An ordered, append-only sequence of messages.
///
/// Index `i` refers to the same message for the lifetime of the process
/// and the length only grows. All operations are safe under concurrent
/// callers; the lock is held only for the index-assign-and-insert step.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: RwLock<Vec<Message>>,
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, assigning it the next index.
    ///
    /// The timestamp is taken under the write lock and clamped so that
    /// timestamps never decrease in log order even if the wall clock
    /// steps backwards. Returns the stored message and its index.
    pub fn append(
        &self,
        user_name: impl Into<String>,
        content: impl Into<String>,
    ) -> (Message, usize) {
        let mut entries = self.write();

        let mut timestamp = Utc::now();
        if let Some(last) = entries.last() {
            if timestamp < last.timestamp {
                timestamp = last.timestamp;
            }
        }

        let message = Message::at(user_name, content, timestamp);
        let index = entries.len();
        entries.push(message.clone());
        trace!(index, "Appended message");

        (message, index)
    }

    /// Point-in-time copy of the full log, in index order.
    ///
    /// Later appends never alter the returned data.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.read().clone()
    }

    /// All messages at positions `>= index`, in order.
    ///
    /// An `index` at or past the end returns an empty vector; that is the
    /// normal steady-state poll case, not an error.
    #[must_use]
    pub fn since(&self, index: usize) -> Vec<Message> {
        let entries = self.read();
        if index >= entries.len() {
            return Vec::new();
        }
        entries[index..].to_vec()
    }

    /// Number of messages appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panicking writer cannot leave a torn entry behind (push is the
    // final operation), so a poisoned lock is safe to recover.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Message>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Message>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn test_append_assigns_sequential_indices() {
        let log = MessageLog::new();

        let (first, i0) = log.append("alice", "hi");
        let (_, i1) = log.append("bob", "yo");

        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(log.len(), 2);
        assert_eq!(first.user_name, "alice");
    }

    #[test]
    fn test_since_past_end_is_empty() {
        let log = MessageLog::new();
        log.append("alice", "hi");

        assert!(log.since(1).is_empty());
        assert!(log.since(100).is_empty());
    }

    #[test]
    fn test_since_zero_equals_snapshot() {
        let log = MessageLog::new();
        log.append("alice", "one");
        log.append("bob", "two");

        assert_eq!(log.since(0), log.snapshot());
        // Reads are idempotent with no intervening append.
        assert_eq!(log.since(1), log.since(1));
    }

    #[test]
    fn test_snapshot_isolated_from_later_appends() {
        let log = MessageLog::new();
        log.append("alice", "one");

        let snapshot = log.snapshot();
        log.append("bob", "two");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let log = MessageLog::new();
        for i in 0..50 {
            log.append("alice", format!("msg {i}"));
        }

        let snapshot = log.snapshot();
        for pair in snapshot.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn test_concurrent_appends_unique_indices() {
        let log = Arc::new(MessageLog::new());
        let indices = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                let indices = Arc::clone(&indices);
                thread::spawn(move || {
                    for i in 0..25 {
                        let (_, index) = log.append(format!("user-{t}"), format!("msg {i}"));
                        indices.lock().unwrap().push(index);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut indices = indices.lock().unwrap().clone();
        indices.sort_unstable();
        // No message lost, none duplicated, no index reused.
        assert_eq!(indices, (0..200).collect::<Vec<_>>());
        assert_eq!(log.len(), 200);
        assert_eq!(log.since(0).len(), 200);
    }
}
