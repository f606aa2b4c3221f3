//! Event bus for per-session lifecycle notifications.
//!
//! Publishing is fire-and-forget over the store's pub/sub: no persistence,
//! no replay, no acknowledgment. A subscriber that connects late or falls
//! behind simply misses events.

use std::sync::Arc;

use sessionflow_core::SessionId;
use sessionflow_store::KeyValueStore;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event::SessionEvent;

/// Pub/sub channel carrying a session's events.
#[must_use]
pub fn channel_name(session_id: &SessionId) -> String {
    format!("channel:session:{session_id}")
}

/// Subscription handle for receiving events.
pub struct EventSubscription {
    channel: String,
    receiver: broadcast::Receiver<String>,
}

impl EventSubscription {
    /// Receive the next event.
    ///
    /// Payloads that do not decode are skipped with a warning, as are gaps
    /// left by a lagging receiver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] once the publisher side is gone.
    pub async fn recv(&mut self) -> Result<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(raw) => {
                    if let Some(event) = self.decode(&raw) {
                        return Ok(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "Subscriber lagged; events dropped");
                }
                Err(RecvError::Closed) => return Err(Error::ChannelClosed),
            }
        }
    }

    /// Try to receive an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] once the publisher side is gone.
    pub fn try_recv(&mut self) -> Result<Option<SessionEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(raw) => {
                    if let Some(event) = self.decode(&raw) {
                        return Ok(Some(event));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "Subscriber lagged; events dropped");
                }
                Err(TryRecvError::Closed) => return Err(Error::ChannelClosed),
            }
        }
    }

    /// Drain everything currently buffered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] once the publisher side is gone.
    pub fn drain(&mut self) -> Result<Vec<SessionEvent>> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv()? {
            events.push(event);
        }
        Ok(events)
    }

    fn decode(&self, raw: &str) -> Option<SessionEvent> {
        match serde_json::from_str(raw) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Skipping undecodable event");
                None
            }
        }
    }
}

/// Event bus for publishing and subscribing to session events.
#[derive(Clone)]
pub struct EventBus {
    store: Arc<dyn KeyValueStore>,
}

impl EventBus {
    /// Create a new event bus over the shared store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Publish an event.
    ///
    /// Returns how many subscribers received it. Failures are logged and
    /// reported as zero receivers; they never reach the caller.
    pub async fn publish(&self, event: &SessionEvent) -> usize {
        let channel = channel_name(&event.session_id);
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel = %channel, error = %e, "Failed to encode event");
                return 0;
            }
        };

        match self.store.publish(&channel, payload).await {
            Ok(receivers) => {
                debug!(
                    session_id = %event.session_id,
                    node = %event.node,
                    status = event.status.as_str(),
                    receivers,
                    "Published event"
                );
                receivers
            }
            Err(e) => {
                warn!(
                    session_id = %event.session_id,
                    status = event.status.as_str(),
                    error = %e,
                    "Failed to publish event"
                );
                0
            }
        }
    }

    /// Subscribe to one session's events.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses the subscription.
    pub async fn subscribe(&self, session_id: &SessionId) -> Result<EventSubscription> {
        let channel = channel_name(session_id);
        let receiver = self
            .store
            .subscribe(&channel)
            .await
            .map_err(|e| Error::subscription_failed(&channel, e.to_string()))?;
        Ok(EventSubscription { channel, receiver })
    }
}
