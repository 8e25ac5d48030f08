//! The broadcast hub.
//!
//! The [`Hub`] is a single-owner actor: it holds the live session set and the
//! message history by value and applies every registration, unregistration
//! and broadcast from one task, in the order they are accepted. Producers
//! talk to it through a cloneable [`HubHandle`].
//!
//! Delivery never waits on a client. Each payload is offered to a session's
//! bounded queue with `try_send`; a session whose queue is full, or whose
//! receiver is gone, is removed and its queue closed in the same pass.

use crate::formatter::{FormatError, Formatter};
use crate::handle::HubHandle;
use crate::history::{History, HistoryRetention};
use crate::message::Message;
use crate::session::{Session, SessionId, SessionKey};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Default per-session queue headroom for live broadcasts.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub loop has stopped.
    #[error("Hub is closed")]
    Closed,

    /// The hub did not accept a request in time.
    #[error("Hub did not accept the request within {0:?}")]
    Timeout(Duration),

    /// A session with this ID is already registered.
    #[error("Session already registered: {0}")]
    DuplicateSession(SessionId),

    /// Formatting failed under [`FormatFailurePolicy::Abort`].
    #[error("Formatting failed: {0}")]
    Format(#[from] FormatError),
}

/// What the hub does when the formatter fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFailurePolicy {
    /// Log and skip delivery of that message; the message stays in history.
    #[default]
    Skip,
    /// Stop the hub loop and return the error from [`Hub::run`].
    Abort,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Queue slots per session for live broadcasts, on top of replay room.
    pub queue_capacity: usize,
    /// How much history is kept for replay.
    pub history: HistoryRetention,
    /// Maximum time a producer waits for the hub to accept a request.
    pub accept_timeout: Option<Duration>,
    /// Behaviour on formatter failure.
    pub format_failure: FormatFailurePolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            history: HistoryRetention::default(),
            accept_timeout: None,
            format_failure: FormatFailurePolicy::default(),
        }
    }
}

impl HubConfig {
    /// Outbound queue size for a new session.
    ///
    /// With bounded history this fits a full replay plus `queue_capacity`
    /// live messages, so a fresh session is never evicted by its own replay.
    #[must_use]
    pub fn session_capacity(&self) -> usize {
        let replay = self.history.limit().unwrap_or(0);
        self.queue_capacity.max(1).saturating_add(replay)
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Number of live sessions.
    pub clients: usize,
    /// Number of retained history messages.
    pub history_len: usize,
    /// Broadcasts accepted since start.
    pub broadcasts_total: u64,
    /// Sessions evicted for being slow or gone.
    pub evictions_total: u64,
}

/// Requests processed by the hub loop.
///
/// Every request carries a reply sender that the loop resolves as soon as
/// the request is accepted, which gives callers a rendezvous point.
#[derive(Debug)]
pub(crate) enum HubCommand {
    Register {
        session: Session,
        accepted: oneshot::Sender<Result<(), HubError>>,
    },
    Unregister {
        key: SessionKey,
        accepted: oneshot::Sender<()>,
    },
    Broadcast {
        message: Message,
        accepted: oneshot::Sender<()>,
    },
    Stats {
        respond_to: oneshot::Sender<HubStats>,
    },
    History {
        respond_to: oneshot::Sender<Vec<Message>>,
    },
}

/// The hub actor. Owns all session and history state.
pub struct Hub {
    receiver: mpsc::Receiver<HubCommand>,
    clients: HashMap<SessionId, Session>,
    history: History,
    formatter: Box<dyn Formatter>,
    format_failure: FormatFailurePolicy,
    broadcasts_total: u64,
    evictions_total: u64,
}

impl Hub {
    /// Create a hub and the handle used to reach it.
    ///
    /// The hub does nothing until [`Hub::run`] is polled.
    #[must_use]
    pub fn new(config: HubConfig, formatter: impl Formatter + 'static) -> (Self, HubHandle) {
        // One slot: a request is either being handed over or not at all.
        let (sender, receiver) = mpsc::channel(1);
        let handle = HubHandle::new(sender, &config);

        info!(
            queue_capacity = config.queue_capacity,
            history = ?config.history,
            format_failure = ?config.format_failure,
            "Creating hub"
        );

        let hub = Self {
            receiver,
            clients: HashMap::new(),
            history: History::new(config.history),
            formatter: Box::new(formatter),
            format_failure: config.format_failure,
            broadcasts_total: 0,
            evictions_total: 0,
        };
        (hub, handle)
    }

    /// Create a hub and run it on a new tokio task.
    #[must_use]
    pub fn spawn(
        config: HubConfig,
        formatter: impl Formatter + 'static,
    ) -> (HubHandle, JoinHandle<Result<(), HubError>>) {
        let (hub, handle) = Self::new(config, formatter);
        (handle, tokio::spawn(hub.run()))
    }

    /// Run the hub loop.
    ///
    /// Processes requests until every [`HubHandle`] has been dropped, then
    /// closes all remaining sessions.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Format`] if formatting fails under
    /// [`FormatFailurePolicy::Abort`].
    pub async fn run(mut self) -> Result<(), HubError> {
        info!("Hub starting");

        while let Some(cmd) = self.receiver.recv().await {
            if let Err(e) = self.handle_command(cmd) {
                error!(
                    error = %e,
                    clients = self.clients.len(),
                    "Hub stopping on fatal error"
                );
                return Err(e);
            }
        }

        info!(
            clients = self.clients.len(),
            history = self.history.len(),
            "Hub stopped"
        );
        Ok(())
    }

    fn handle_command(&mut self, cmd: HubCommand) -> Result<(), HubError> {
        match cmd {
            HubCommand::Register { session, accepted } => self.handle_register(session, accepted),
            HubCommand::Unregister { key, accepted } => {
                let _ = accepted.send(());
                self.handle_unregister(&key);
                Ok(())
            }
            HubCommand::Broadcast { message, accepted } => {
                let _ = accepted.send(());
                self.handle_broadcast(message)
            }
            HubCommand::Stats { respond_to } => {
                let _ = respond_to.send(self.stats());
                Ok(())
            }
            HubCommand::History { respond_to } => {
                let _ = respond_to.send(self.history.snapshot());
                Ok(())
            }
        }
    }

    fn handle_register(
        &mut self,
        session: Session,
        accepted: oneshot::Sender<Result<(), HubError>>,
    ) -> Result<(), HubError> {
        let id = session.id().clone();

        if self.clients.contains_key(&id) {
            warn!(session = %id, "Rejecting duplicate session");
            // Dropping the rejected session closes its queue.
            let _ = accepted.send(Err(HubError::DuplicateSession(id)));
            return Ok(());
        }

        self.clients.insert(id.clone(), session);
        let _ = accepted.send(Ok(()));
        debug!(session = %id, clients = self.clients.len(), "Session registered");

        self.replay(&id)
    }

    /// Send retained history to a newly registered session.
    fn replay(&mut self, id: &SessionId) -> Result<(), HubError> {
        let (replayed, failure) = {
            let Some(session) = self.clients.get(id) else {
                return Ok(());
            };

            let mut replayed = 0usize;
            let mut failure = None;
            for message in self.history.iter() {
                let Some(payload) = self.format(message)? else {
                    continue;
                };
                if let Err(reason) = session.try_deliver(payload) {
                    failure = Some(reason);
                    break;
                }
                replayed += 1;
            }
            (replayed, failure)
        };

        match failure {
            None => trace!(session = %id, messages = replayed, "Replayed history"),
            Some(reason) => {
                self.clients.remove(id);
                self.evictions_total += 1;
                warn!(session = %id, %reason, replayed, "Session evicted during replay");
            }
        }
        Ok(())
    }

    fn handle_unregister(&mut self, key: &SessionKey) {
        // Only the registered instance may be removed; a rejected duplicate
        // shares the ID but not the key.
        if !self.clients.get(key.id()).is_some_and(|s| s.key() == key) {
            trace!(session = %key, "Ignoring unregister for unknown session");
            return;
        }
        // Removing drops the session, which closes its queue exactly once.
        self.clients.remove(key.id());
        debug!(session = %key.id(), clients = self.clients.len(), "Session unregistered");
    }

    fn handle_broadcast(&mut self, message: Message) -> Result<(), HubError> {
        let payload = self.format(&message)?;
        self.history.push(message);
        self.broadcasts_total += 1;

        let Some(payload) = payload else {
            return Ok(());
        };

        let mut evicted = 0u64;
        self.clients.retain(|id, session| match session.try_deliver(payload.clone()) {
            Ok(()) => true,
            Err(reason) => {
                debug!(session = %id, %reason, "Evicting session");
                evicted += 1;
                false
            }
        });
        self.evictions_total += evicted;

        trace!(
            recipients = self.clients.len(),
            evicted,
            bytes = payload.len(),
            "Broadcast delivered"
        );
        Ok(())
    }

    /// Format a message, applying the failure policy.
    ///
    /// `Ok(None)` means the message was skipped.
    fn format(&self, message: &Message) -> Result<Option<Bytes>, HubError> {
        match self.formatter.format(message) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => match self.format_failure {
                FormatFailurePolicy::Skip => {
                    warn!(client = %message.client_id, error = %e, "Skipping message that failed to format");
                    Ok(None)
                }
                FormatFailurePolicy::Abort => Err(HubError::Format(e)),
            },
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            clients: self.clients.len(),
            history_len: self.history.len(),
            broadcasts_total: self.broadcasts_total,
            evictions_total: self.evictions_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::JsonFormatter;
    use crate::session::TryRecvError;

    fn text_formatter(m: &Message) -> Result<Bytes, FormatError> {
        Ok(Bytes::from(format!("{}:{}", m.client_id, m.text)))
    }

    fn drain(outbound: &mut crate::session::Outbound) -> Vec<Bytes> {
        let mut items = Vec::new();
        while let Ok(item) = outbound.try_recv() {
            items.push(item);
        }
        items
    }

    #[test]
    fn test_session_capacity() {
        let config = HubConfig {
            queue_capacity: 8,
            history: HistoryRetention::Bounded(100),
            ..Default::default()
        };
        assert_eq!(config.session_capacity(), 108);

        let config = HubConfig {
            queue_capacity: 0,
            history: HistoryRetention::Unbounded,
            ..Default::default()
        };
        assert_eq!(config.session_capacity(), 1);
    }

    #[test]
    fn test_broadcast_appends_and_delivers() {
        let (mut hub, _handle) = Hub::new(HubConfig::default(), text_formatter);
        let (session, mut outbound) = Session::new("s1", 4);
        let (tx, _rx) = oneshot::channel();
        hub.handle_register(session, tx).unwrap();

        hub.handle_broadcast(Message::new("A", "hi")).unwrap();

        assert_eq!(drain(&mut outbound), vec![Bytes::from_static(b"A:hi")]);
        assert_eq!(hub.stats().history_len, 1);
        assert_eq!(hub.stats().broadcasts_total, 1);
    }

    #[test]
    fn test_full_queue_is_evicted_in_same_pass() {
        let (mut hub, _handle) = Hub::new(HubConfig::default(), JsonFormatter);
        let (slow, mut slow_out) = Session::new("slow", 1);
        let (fast, mut fast_out) = Session::new("fast", 8);
        for session in [slow, fast] {
            let (tx, _rx) = oneshot::channel();
            hub.handle_register(session, tx).unwrap();
        }

        hub.handle_broadcast(Message::new("A", "1")).unwrap();
        hub.handle_broadcast(Message::new("A", "2")).unwrap();

        assert_eq!(hub.stats().clients, 1);
        assert_eq!(hub.stats().evictions_total, 1);
        assert!(!hub.clients.contains_key(&SessionId::from("slow")));

        // The slow session keeps what it had queued, then sees end-of-stream.
        assert_eq!(drain(&mut slow_out).len(), 1);
        assert!(matches!(slow_out.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(drain(&mut fast_out).len(), 2);
    }

    #[test]
    fn test_skip_policy_keeps_history() {
        let failing = |m: &Message| -> Result<Bytes, FormatError> {
            if m.text == "bad" {
                Err(FormatError::Other("boom".into()))
            } else {
                Ok(Bytes::from(m.text.clone()))
            }
        };
        let (mut hub, _handle) = Hub::new(HubConfig::default(), failing);
        let (session, mut outbound) = Session::new("s1", 4);
        let (tx, _rx) = oneshot::channel();
        hub.handle_register(session, tx).unwrap();

        hub.handle_broadcast(Message::new("A", "bad")).unwrap();
        hub.handle_broadcast(Message::new("A", "good")).unwrap();

        assert_eq!(drain(&mut outbound), vec![Bytes::from_static(b"good")]);
        assert_eq!(hub.stats().history_len, 2);
        assert_eq!(hub.stats().clients, 1);
    }

    #[test]
    fn test_abort_policy_returns_error() {
        let failing =
            |_: &Message| -> Result<Bytes, FormatError> { Err(FormatError::Other("boom".into())) };
        let config = HubConfig {
            format_failure: FormatFailurePolicy::Abort,
            ..Default::default()
        };
        let (mut hub, _handle) = Hub::new(config, failing);

        let result = hub.handle_broadcast(Message::new("A", "x"));
        assert!(matches!(result, Err(HubError::Format(FormatError::Other(_)))));
    }
}
