//! The relay transport capability.
//!
//! Engine components take a [`RelayTransport`] instead of reaching for a
//! global pool, so tests can hand them a stub that never touches the network.

use crate::error::Result;
use crate::message::Filter;
use async_trait::async_trait;
use nostr::Event;
use std::collections::HashSet;
use std::fmt;
use tokio::sync::mpsc;

/// Confirmation result for event publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfirmation {
    /// Relay that answered
    pub relay_url: String,
    /// Event ID that was published
    pub event_id: String,
    /// Whether the relay accepted the event
    pub accepted: bool,
    /// Message from the relay (empty if accepted, error message if rejected)
    pub message: String,
}

/// Items delivered to a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionMessage {
    Event { relay_url: String, event: Event },
    Eose { relay_url: String },
    Closed { relay_url: String, message: String },
}

type CloseHook = Box<dyn FnOnce(&str) + Send + Sync>;

/// Handle to an open subscription.
///
/// Events arrive in relay order. Closing (explicitly or by dropping the
/// handle) sends `CLOSE` for the subscription id.
pub struct Subscription {
    id: String,
    receiver: mpsc::UnboundedReceiver<SubscriptionMessage>,
    seen: HashSet<String>,
    on_close: Option<CloseHook>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.on_close.is_none())
            .finish()
    }
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<SubscriptionMessage>,
    ) -> Self {
        Self {
            id: id.into(),
            receiver,
            seen: HashSet::new(),
            on_close: None,
        }
    }

    /// Run `hook` with the subscription id when the subscription is closed.
    pub fn on_close(mut self, hook: impl FnOnce(&str) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next raw message, or `None` once every relay side has gone away.
    pub async fn next_message(&mut self) -> Option<SubscriptionMessage> {
        self.receiver.recv().await
    }

    /// Next event not seen before on this subscription.
    ///
    /// EOSE and CLOSED markers are skipped.
    pub async fn next_event(&mut self) -> Option<Event> {
        while let Some(message) = self.receiver.recv().await {
            if let SubscriptionMessage::Event { event, .. } = message
                && self.seen.insert(event.id.clone())
            {
                return Some(event);
            }
        }
        None
    }

    pub fn close(mut self) {
        self.run_close_hook();
    }

    fn run_close_hook(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook(&self.id);
        }
        self.receiver.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_close_hook();
    }
}

/// Publish/subscribe access to a set of relays.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Publish to every relay and collect one confirmation per relay that answered.
    async fn publish(&self, relays: &[String], event: &Event) -> Result<Vec<PublishConfirmation>>;

    /// One-shot query: gather stored events until every relay sent EOSE.
    ///
    /// Results are de-duplicated by event id.
    async fn query_sync(&self, relays: &[String], filter: Filter) -> Result<Vec<Event>>;

    /// Open a live subscription.
    ///
    /// Returns once the `REQ` has been handed to every reachable relay, so an
    /// event published after this call cannot be missed.
    async fn subscribe(&self, relays: &[String], filter: Filter) -> Result<Subscription>;
}
