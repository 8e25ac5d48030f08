//! Producer-side interface to the hub.

use crate::hub::{HubCommand, HubConfig, HubError, HubStats};
use crate::message::Message;
use crate::session::{Outbound, Session, SessionId, SessionKey};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Cheap-to-clone handle for talking to a running [`Hub`](crate::Hub).
///
/// Every call waits until the hub loop accepts the request, and no longer:
/// `register` returns before history replay has finished, `submit` before
/// the message reaches any client. When an accept timeout is configured a
/// call that exceeds it fails with [`HubError::Timeout`]; the request may
/// still be applied later, so callers should treat a timed-out
/// registration as a dead session and unregister it by its key.
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
    session_capacity: usize,
    accept_timeout: Option<Duration>,
}

impl HubHandle {
    pub(crate) fn new(sender: mpsc::Sender<HubCommand>, config: &HubConfig) -> Self {
        Self {
            sender,
            session_capacity: config.session_capacity(),
            accept_timeout: config.accept_timeout,
        }
    }

    /// Create a session sized for this hub.
    ///
    /// See [`HubConfig::session_capacity`].
    #[must_use]
    pub fn open_session(&self, id: impl Into<SessionId>) -> (Session, Outbound) {
        Session::new(id, self.session_capacity)
    }

    /// Add a session to the live set.
    ///
    /// Returns once the hub has inserted the session; history replay happens
    /// afterwards but before any later broadcast.
    ///
    /// # Errors
    ///
    /// - `HubError::DuplicateSession` if a session with this ID is live
    /// - `HubError::Timeout` if the hub did not accept in time
    /// - `HubError::Closed` if the hub has stopped
    pub async fn register(&self, session: Session) -> Result<(), HubError> {
        self.request(|accepted| HubCommand::Register { session, accepted })
            .await?
    }

    /// Remove a session from the live set and close its queue.
    ///
    /// Only the session the key was issued for is removed. Unregistering an
    /// unknown, already removed or rejected session is a no-op, even when
    /// another live session has the same ID.
    ///
    /// # Errors
    ///
    /// - `HubError::Timeout` if the hub did not accept in time
    /// - `HubError::Closed` if the hub has stopped
    pub async fn unregister(&self, key: &SessionKey) -> Result<(), HubError> {
        let key = key.clone();
        self.request(|accepted| HubCommand::Unregister { key, accepted })
            .await
    }

    /// Submit a message for broadcast to every live session.
    ///
    /// # Errors
    ///
    /// - `HubError::Timeout` if the hub did not accept in time
    /// - `HubError::Closed` if the hub has stopped
    pub async fn submit(&self, message: Message) -> Result<(), HubError> {
        self.request(|accepted| HubCommand::Broadcast { message, accepted })
            .await
    }

    /// Get hub statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped or did not answer in time.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.request(|respond_to| HubCommand::Stats { respond_to })
            .await
    }

    /// Get a copy of the retained history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped or did not answer in time.
    pub async fn history(&self) -> Result<Vec<Message>, HubError> {
        self.request(|respond_to| HubCommand::History { respond_to })
            .await
    }

    /// Check if the hub loop has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (tx, rx) = oneshot::channel();
        let exchange = async {
            self.sender
                .send(command(tx))
                .await
                .map_err(|_| HubError::Closed)?;
            rx.await.map_err(|_| HubError::Closed)
        };
        with_timeout(self.accept_timeout, exchange).await
    }
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, HubError>>,
) -> Result<T, HubError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| HubError::Timeout(limit))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::JsonFormatter;
    use crate::hub::Hub;

    #[tokio::test]
    async fn test_closed_hub() {
        let (hub, handle) = Hub::new(HubConfig::default(), JsonFormatter);
        drop(hub);

        assert!(handle.is_closed());
        assert!(matches!(
            handle.submit(Message::new("A", "hi")).await,
            Err(HubError::Closed)
        ));
        let (session, _outbound) = handle.open_session("s1");
        assert!(matches!(
            handle.register(session).await,
            Err(HubError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_timeout() {
        let config = HubConfig {
            accept_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        // Hub constructed but never run: nothing accepts requests.
        let (_hub, handle) = Hub::new(config, JsonFormatter);

        // The first request fills the intake slot, then waits for a reply.
        match handle.submit(Message::new("A", "1")).await {
            Err(HubError::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(50)),
            other => panic!("Expected Timeout, got {:?}", other),
        }
        // The second cannot even be handed over.
        assert!(matches!(
            handle.stats().await,
            Err(HubError::Timeout(_))
        ));
    }

    #[test]
    fn test_open_session_uses_hub_capacity() {
        let config = HubConfig {
            queue_capacity: 4,
            history: crate::HistoryRetention::Bounded(10),
            ..Default::default()
        };
        let (_hub, handle) = Hub::new(config, JsonFormatter);
        let (session, outbound) = handle.open_session("s1");

        assert_eq!(session.capacity(), 14);
        assert_eq!(outbound.id().as_str(), "s1");
    }
}
