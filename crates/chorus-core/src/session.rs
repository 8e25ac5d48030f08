//! Client sessions.
//!
//! A session is the hub's view of one connected client: an identifier and the
//! sending half of a bounded outbound queue. The receiving half
//! ([`Outbound`]) belongs to the transport writer. Dropping the [`Session`]
//! closes the queue; the writer then drains what is left and sees
//! end-of-stream.

use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub use tokio::sync::mpsc::error::TryRecvError;

/// Counter mixed into generated IDs so two sessions created in the same
/// nanosecond still differ.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

static SESSION_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session ID from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh session ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("sess_{:x}{:04x}", timestamp, counter & 0xffff))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
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

/// Identifies one particular session, not just its ID.
///
/// Two sessions opened with the same [`SessionId`] have different keys, so a
/// connection can only ever unregister the session it opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    id: SessionId,
    token: u64,
}

impl SessionKey {
    fn next(id: SessionId) -> Self {
        Self {
            id,
            token: SESSION_TOKEN.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id, self.token)
    }
}

/// Why a delivery attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The outbound queue is at capacity.
    Full,
    /// The transport dropped the receiving end.
    Disconnected,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryFailure::Full => f.write_str("outbound queue full"),
            DeliveryFailure::Disconnected => f.write_str("receiver dropped"),
        }
    }
}

/// The hub side of a connected client.
#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    outbound: mpsc::Sender<Bytes>,
}

impl Session {
    /// Create a session and its outbound receiver.
    ///
    /// `capacity` is the number of payloads that may be queued before the
    /// session counts as too slow and is evicted. A capacity of zero is
    /// raised to one.
    #[must_use]
    pub fn new(id: impl Into<SessionId>, capacity: usize) -> (Self, Outbound) {
        let key = SessionKey::next(id.into());
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                key: key.clone(),
                outbound: sender,
            },
            Outbound { key, receiver },
        )
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.key.id
    }

    /// Get the key that unregisters this session.
    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Get the outbound queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.outbound.max_capacity()
    }

    /// Enqueue a payload without waiting.
    pub(crate) fn try_deliver(&self, payload: Bytes) -> Result<(), DeliveryFailure> {
        self.outbound.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::Full,
            TrySendError::Closed(_) => DeliveryFailure::Disconnected,
        })
    }
}

/// The transport side of a session's outbound queue.
#[derive(Debug)]
pub struct Outbound {
    key: SessionKey,
    receiver: mpsc::Receiver<Bytes>,
}

impl Outbound {
    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.key.id
    }

    /// Get the key of the session this queue belongs to.
    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Wait for the next payload.
    ///
    /// Returns `None` once the hub has closed the session and every queued
    /// payload has been received.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    /// Take the next payload if one is queued.
    ///
    /// # Errors
    ///
    /// Returns [`TryRecvError::Empty`] if nothing is queued, or
    /// [`TryRecvError::Disconnected`] once the session is closed and drained.
    pub fn try_recv(&mut self) -> Result<Bytes, TryRecvError> {
        self.receiver.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_generation() {
        let id1 = SessionId::generate();
        let id2 = SessionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("sess_"));
    }

    #[test]
    fn test_session_id_from_string() {
        let id: SessionId = "test-id".into();
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
    }

    #[test]
    fn test_same_id_different_keys() {
        let (first, first_out) = Session::new("dup", 1);
        let (second, _second_out) = Session::new("dup", 1);

        assert_eq!(first.id(), second.id());
        assert_ne!(first.key(), second.key());
        assert_eq!(first.key(), first_out.key());
    }

    #[test]
    fn test_deliver_until_full() {
        let (session, mut outbound) = Session::new("s1", 2);
        assert_eq!(session.capacity(), 2);

        assert!(session.try_deliver(Bytes::from_static(b"a")).is_ok());
        assert!(session.try_deliver(Bytes::from_static(b"b")).is_ok());
        assert_eq!(
            session.try_deliver(Bytes::from_static(b"c")),
            Err(DeliveryFailure::Full)
        );

        assert_eq!(outbound.try_recv().unwrap(), Bytes::from_static(b"a"));
        assert!(session.try_deliver(Bytes::from_static(b"c")).is_ok());
    }

    #[test]
    fn test_deliver_after_receiver_dropped() {
        let (session, outbound) = Session::new("s1", 4);
        drop(outbound);

        assert_eq!(
            session.try_deliver(Bytes::from_static(b"a")),
            Err(DeliveryFailure::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_drop_closes_after_drain() {
        let (session, mut outbound) = Session::new("s1", 4);
        session.try_deliver(Bytes::from_static(b"last")).unwrap();
        drop(session);

        assert_eq!(outbound.recv().await, Some(Bytes::from_static(b"last")));
        assert_eq!(outbound.recv().await, None);
        assert!(matches!(outbound.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let (session, _outbound) = Session::new("s1", 0);
        assert_eq!(session.capacity(), 1);
    }
}
