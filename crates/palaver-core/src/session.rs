//! Live push sessions and the registry that tracks them.
//!
//! A session is the server-side handle for one open push connection. The
//! registry supports concurrent insert, remove, and broadcast-with-prune
//! with no caller-side locking.

use bytes::Bytes;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// Atomic counter so IDs stay unique even within the same nanosecond.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a push session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a session ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique session ID.
    #[must_use]
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let counter = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("sess_{timestamp:x}-{counter}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Delivery failure for a single session.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport behind the session is gone.
    #[error("Session transport closed")]
    Closed,

    /// The transport write failed.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// A serialized message headed for push sessions.
///
/// `seq` is the message's log index; `payload` is the shared JSON wire
/// form, so fan-out never re-encodes per recipient.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Log index of the message.
    pub seq: u64,
    /// Encoded wire payload, cheap to clone.
    pub payload: Bytes,
}

/// Delivery handle for one live connection.
///
/// Implementations must not block: a real transport enqueues the frame
/// on the session's own outbound queue and fails only once that queue is
/// gone. A slow socket therefore backs up only itself.
pub trait SessionSink: Send + Sync {
    /// Hand one frame to the session's transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport can no longer accept frames;
    /// the registry removes the session in response.
    fn deliver(&self, frame: Outbound) -> Result<(), DeliveryError>;
}

/// One live push connection.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    sink: Arc<dyn SessionSink>,
    connected_at: Instant,
}

impl Session {
    /// Create a session around a delivery sink.
    #[must_use]
    pub fn new(id: SessionId, sink: Arc<dyn SessionSink>) -> Self {
        Self {
            id,
            sink,
            connected_at: Instant::now(),
        }
    }

    /// The session's identifier.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// When the connection was established (for logging, not correctness).
    #[must_use]
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Deliver one frame through the session's sink.
    ///
    /// # Errors
    ///
    /// Propagates the sink's delivery failure.
    pub fn deliver(&self, frame: Outbound) -> Result<(), DeliveryError> {
        self.sink.deliver(frame)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// Registry of live push sessions.
///
/// A session present here is assumed live until a delivery attempt
/// proves otherwise. Nothing outside the registry keeps a writing
/// reference, so remove-and-forget is the only destruction path.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Session>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session, keyed by its identifier. Last write wins when the
    /// same ID registers twice.
    pub fn register(&self, session: Session) {
        let id = session.id().clone();
        self.sessions.insert(id.clone(), session);
        debug!(session = %id, total = self.sessions.len(), "Session registered");
    }

    /// Remove a session if present; no-op when absent.
    pub fn unregister(&self, id: &SessionId) {
        if self.sessions.remove(id).is_some() {
            debug!(session = %id, total = self.sessions.len(), "Session unregistered");
        }
    }

    /// Check whether a session is registered.
    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether any sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Visit every live session; a session for which `f` fails is
    /// unregistered as part of the same pass.
    ///
    /// This is the broadcast-and-prune primitive: one session's failure
    /// never aborts the pass or surfaces to the caller.
    pub fn for_each_live(&self, mut f: impl FnMut(&Session) -> Result<(), DeliveryError>) {
        self.sessions.retain(|id, session| match f(session) {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %id, error = %e, "Dropping session after failed delivery");
                false
            }
        });
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    fn frame(seq: u64) -> Outbound {
        Outbound {
            seq,
            payload: Bytes::from_static(b"{}"),
        }
    }

    #[test]
    fn test_session_id_generation_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("sess_"));
    }

    #[test]
    fn test_register_unregister() {
        let registry = SessionRegistry::new();
        let id = SessionId::from("s-1");

        registry.register(Session::new(id.clone(), RecordingSink::new()));
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);

        registry.unregister(&id);
        assert!(!registry.contains(&id));
        assert!(registry.is_empty());

        // Unregistering an absent session never fails.
        registry.unregister(&id);
    }

    #[test]
    fn test_register_same_id_last_write_wins() {
        let registry = SessionRegistry::new();
        let id = SessionId::from("dup");
        let first = RecordingSink::new();
        let second = RecordingSink::new();

        registry.register(Session::new(id.clone(), first.clone()));
        registry.register(Session::new(id.clone(), second.clone()));
        assert_eq!(registry.len(), 1);

        registry.for_each_live(|s| s.deliver(frame(0)));
        assert!(first.payloads().is_empty());
        assert_eq!(second.seqs(), vec![0]);
    }

    #[test]
    fn test_for_each_live_prunes_failures() {
        let registry = SessionRegistry::new();
        let healthy = RecordingSink::new();
        let broken = RecordingSink::failing();

        registry.register(Session::new("ok".into(), healthy.clone()));
        registry.register(Session::new("bad".into(), broken));

        registry.for_each_live(|s| s.deliver(frame(7)));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&"ok".into()));
        assert!(!registry.contains(&"bad".into()));
        assert_eq!(healthy.seqs(), vec![7]);
    }
}
