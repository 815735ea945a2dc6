//! Fan-out of freshly appended messages to live push sessions.

use crate::message::Message;
use crate::session::{Outbound, SessionRegistry};
use std::sync::Arc;
use tracing::{error, trace};

/// Delivers each new message to every registered session.
///
/// The message is encoded once; each session receives a cheap clone of
/// the shared payload. A failed delivery removes only that session and
/// never surfaces to the caller.
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over a session registry.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this broadcaster delivers to.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Broadcast `message`, which sits at log index `seq`, to all live
    /// sessions.
    ///
    /// Infallible by design: sessions that fail delivery are pruned, and
    /// a message that cannot be encoded is skipped for push entirely (it
    /// remains in the log, so pollers still see it).
    pub fn broadcast(&self, seq: u64, message: &Message) {
        let payload = match message.to_wire() {
            Ok(payload) => payload,
            Err(e) => {
                error!(seq, error = %e, "Failed to encode message for broadcast");
                return;
            }
        };

        let frame = Outbound { seq, payload };
        let recipients = self.registry.len();
        self.registry
            .for_each_live(|session| session.deliver(frame.clone()));
        trace!(seq, recipients, "Broadcast message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::RecordingSink;
    use crate::session::Session;

    #[test]
    fn test_broadcast_reaches_all_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let first = RecordingSink::new();
        let second = RecordingSink::new();

        registry.register(Session::new("s-1".into(), first.clone()));
        registry.register(Session::new("s-2".into(), second.clone()));

        broadcaster.broadcast(0, &Message::new("alice", "hi"));

        for sink in [&first, &second] {
            let payloads = sink.payloads();
            assert_eq!(payloads.len(), 1);
            assert!(payloads[0].contains(r#""userName":"alice""#));
            assert!(payloads[0].contains(r#""content":"hi""#));
        }
    }

    #[test]
    fn test_failed_session_pruned_while_rest_deliver() {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let healthy = RecordingSink::new();

        registry.register(Session::new("ok".into(), healthy.clone()));
        registry.register(Session::new("bad".into(), RecordingSink::failing()));

        broadcaster.broadcast(3, &Message::new("bob", "yo"));

        assert_eq!(healthy.seqs(), vec![3]);
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(&"bad".into()));
    }

    #[test]
    fn test_broadcast_with_no_sessions_is_noop() {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        broadcaster.broadcast(0, &Message::new("alice", "anyone here?"));
        assert!(registry.is_empty());
    }
}
