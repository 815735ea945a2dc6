//! Ingress adapter: the single funnel through which messages enter.
//!
//! Both the pull-style REST write and the push-style WebSocket write go
//! through [`ChatHub::submit`], which guarantees every accepted message
//! is appended to the log and broadcast exactly once, in the same order.

use crate::broadcast::Broadcaster;
use crate::log::MessageLog;
use crate::message::Message;
use crate::session::SessionRegistry;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Validation failures for [`ChatHub::submit`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Sender name is empty or whitespace.
    #[error("userName must not be blank")]
    BlankUserName,

    /// Message body is empty or whitespace.
    #[error("content must not be blank")]
    BlankContent,
}

/// The ingress adapter over the log and the broadcast engine.
///
/// Appends before broadcasting, so a message is always visible to
/// pollers no later than the moment push clients are notified.
pub struct ChatHub {
    log: Arc<MessageLog>,
    registry: Arc<SessionRegistry>,
    broadcaster: Broadcaster,
}

impl ChatHub {
    /// Create a hub with a fresh log and registry.
    ///
    /// Both live exactly as long as the hub; there are no process-wide
    /// globals and no reset operation.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(Arc::new(MessageLog::new()), Arc::new(SessionRegistry::new()))
    }

    /// Create a hub over an existing log and registry.
    ///
    /// Lets another ingress adapter share the same state, so messages
    /// accepted through a different channel stay consistent with these.
    #[must_use]
    pub fn with_parts(log: Arc<MessageLog>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            log,
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
        }
    }

    /// Validate and accept a message from any ingress channel.
    ///
    /// Sender and content are trimmed before validation; the trimmed
    /// forms are what gets stored.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] if either field is blank; the log is left
    /// untouched and nothing is broadcast.
    pub fn submit(&self, user_name: &str, content: &str) -> Result<Message, SubmitError> {
        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(SubmitError::BlankUserName);
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(SubmitError::BlankContent);
        }

        let (message, index) = self.log.append(user_name, content);
        debug!(index, user = %message.user_name, "Accepted message");
        self.broadcaster.broadcast(index as u64, &message);

        Ok(message)
    }

    /// The message log, for pull reads and backfill snapshots.
    #[must_use]
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// The session registry, for connection lifecycle hooks.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The broadcast engine, for adapters that accept messages through a
    /// channel other than [`ChatHub::submit`].
    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::RecordingSink;
    use crate::session::Session;
    use std::thread;

    #[test]
    fn test_submit_appends_trimmed_message() {
        let hub = ChatHub::new();

        let message = hub.submit("  alice  ", " hi there ").unwrap();
        assert_eq!(message.user_name, "alice");
        assert_eq!(message.content, "hi there");
        assert_eq!(hub.log().len(), 1);
    }

    #[test]
    fn test_blank_fields_rejected_without_append() {
        let hub = ChatHub::new();

        assert_eq!(hub.submit("", "hello"), Err(SubmitError::BlankUserName));
        assert_eq!(hub.submit("alice", "   "), Err(SubmitError::BlankContent));
        assert_eq!(hub.log().len(), 0);
    }

    #[test]
    fn test_submit_broadcasts_with_log_index() {
        let hub = ChatHub::new();
        let sink = RecordingSink::new();
        hub.registry()
            .register(Session::new("s".into(), sink.clone()));

        hub.submit("alice", "first").unwrap();
        hub.submit("bob", "second").unwrap();

        assert_eq!(sink.seqs(), vec![0, 1]);
    }

    #[test]
    fn test_late_session_sees_only_later_messages() {
        let hub = ChatHub::new();

        hub.submit("alice", "hi").unwrap();

        let sink = RecordingSink::new();
        hub.registry()
            .register(Session::new("s".into(), sink.clone()));

        hub.submit("bob", "yo").unwrap();

        // Exactly one push, for the message appended after registration.
        let payloads = sink.payloads();
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].contains("yo"));
        assert_eq!(sink.seqs(), vec![1]);

        // A poller still sees the whole history in order.
        let all = hub.log().since(0);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "hi");
        assert_eq!(all[1].content, "yo");
    }

    #[test]
    fn test_backfill_exactly_once() {
        let hub = ChatHub::new();
        for i in 0..3 {
            hub.submit("alice", &format!("old {i}")).unwrap();
        }

        // Connection establishment: register first, snapshot second.
        // Queued pushes below the backfill length duplicate the backfill
        // and get filtered, exactly as the transport layer does.
        let sink = RecordingSink::new();
        hub.registry()
            .register(Session::new("s".into(), sink.clone()));
        let backfill = hub.log().snapshot();
        let backfill_len = backfill.len() as u64;

        hub.submit("bob", "new").unwrap();

        let mut received: Vec<String> = backfill.iter().map(|m| m.content.clone()).collect();
        for frame in sink.frames.lock().unwrap().iter() {
            if frame.seq >= backfill_len {
                let message: Message = serde_json::from_slice(&frame.payload).unwrap();
                received.push(message.content);
            }
        }

        assert_eq!(received, vec!["old 0", "old 1", "old 2", "new"]);
    }

    #[test]
    fn test_concurrent_submits_all_observed_in_order() {
        let hub = Arc::new(ChatHub::new());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let hub = Arc::clone(&hub);
                thread::spawn(move || {
                    for i in 0..25 {
                        hub.submit(format!("user-{t}").as_str(), format!("msg {i}").as_str())
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let all = hub.log().since(0);
        assert_eq!(all.len(), 100);
        // Per-writer order is preserved in the linearization.
        for t in 0..4 {
            let own: Vec<_> = all
                .iter()
                .filter(|m| m.user_name == format!("user-{t}"))
                .map(|m| m.content.clone())
                .collect();
            let expected: Vec<_> = (0..25).map(|i| format!("msg {i}")).collect();
            assert_eq!(own, expected);
        }
    }
}
