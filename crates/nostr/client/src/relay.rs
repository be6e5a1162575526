//! A single WebSocket connection to a relay.
//!
//! The connection owns two background tasks: a writer draining an outgoing
//! queue into the socket, and a reader routing `OK` messages to pending
//! publishes and `EVENT`/`EOSE`/`CLOSED` messages to subscriptions by id.

use crate::error::{ClientError, Result};
use crate::message::{ClientMessage, Filter, RelayMessage};
use crate::transport::{PublishConfirmation, SubscriptionMessage};
use futures::{SinkExt, StreamExt};
use nostr::Event;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Relay connection configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// WebSocket handshake timeout
    pub connect_timeout: Duration,
    /// How long to wait for the relay's `OK` after publishing
    pub publish_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

struct Outgoing {
    text: String,
    ack: Option<oneshot::Sender<Result<()>>>,
}

type ConfirmationSender = oneshot::Sender<PublishConfirmation>;
type SubscriptionSender = mpsc::UnboundedSender<SubscriptionMessage>;

/// Closes a subscription without awaiting; usable from `Drop`.
#[derive(Clone)]
pub(crate) struct CloseHandle {
    url: String,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    subscriptions: Arc<Mutex<HashMap<String, SubscriptionSender>>>,
}

impl CloseHandle {
    /// Stop routing `subscription_id` and send `CLOSE` for it.
    pub(crate) fn close(&self, subscription_id: &str) {
        self.forget(subscription_id);

        let close = ClientMessage::Close {
            subscription_id: subscription_id.to_string(),
        };
        match close.to_json() {
            Ok(text) => {
                debug!("CLOSE {} on {}", subscription_id, self.url);
                // Writer may already be gone; the relay then drops it with the socket
                let _ = self.outgoing.send(Outgoing { text, ack: None });
            }
            Err(e) => warn!("Failed to encode CLOSE for {}: {}", subscription_id, e),
        }
    }

    fn forget(&self, subscription_id: &str) {
        if let Ok(mut subs) = self.subscriptions.try_lock() {
            subs.remove(subscription_id);
            return;
        }
        // The reader holds the map while routing; finish the removal once it lets go
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let subscriptions = Arc::clone(&self.subscriptions);
        let id = subscription_id.to_string();
        runtime.spawn(async move {
            subscriptions.lock().await.remove(&id);
        });
    }
}

/// Relay connection
pub struct RelayConnection {
    url: Url,
    config: RelayConfig,
    state: Arc<RwLock<ConnectionState>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    pending_confirmations: Arc<Mutex<HashMap<String, ConfirmationSender>>>,
    subscriptions: Arc<Mutex<HashMap<String, SubscriptionSender>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RelayConnection {
    /// Create a new relay connection (does not connect yet)
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, RelayConfig::default())
    }

    pub fn with_config(url: &str, config: RelayConfig) -> Result<Self> {
        let url = Url::parse(url)?;

        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                url.scheme()
            )));
        }

        Ok(Self {
            url,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing: Mutex::new(None),
            pending_confirmations: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Connect if not already connected.
    pub async fn connect(&self) -> Result<()> {
        // Holding the outgoing slot serializes concurrent connect attempts
        let mut outgoing_slot = self.outgoing.lock().await;
        if *self.state.read().await == ConnectionState::Connected {
            return Ok(());
        }
        *self.state.write().await = ConnectionState::Connecting;

        info!("Connecting to relay: {}", self.url);

        let ws_stream = match timeout(self.config.connect_timeout, connect_async(self.url.as_str()))
            .await
        {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ClientError::WebSocket(e.to_string()));
            }
            Err(_) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ClientError::Timeout(format!(
                    "Connection timeout after {:?}",
                    self.config.connect_timeout
                )));
            }
        };

        let (mut sink, mut stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();

        let url = self.url.to_string();
        let state = Arc::clone(&self.state);
        let writer = tokio::spawn(async move {
            while let Some(Outgoing { text, ack }) = out_rx.recv().await {
                let result = sink
                    .send(Message::Text(text.into()))
                    .await
                    .map_err(|e| ClientError::WebSocket(e.to_string()));
                let failed = result.is_err();
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
                if failed {
                    warn!("Write to {} failed, closing writer", url);
                    *state.write().await = ConnectionState::Disconnected;
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let url = self.url.to_string();
        let state = Arc::clone(&self.state);
        let pending_confirmations = Arc::clone(&self.pending_confirmations);
        let subscriptions = Arc::clone(&self.subscriptions);
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => {
                        info!("Relay {} closed connection", url);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("WebSocket error from {}: {}", url, e);
                        break;
                    }
                };

                match RelayMessage::from_json(text.as_str()) {
                    Ok(message) => {
                        route_message(&url, message, &pending_confirmations, &subscriptions).await
                    }
                    Err(e) => debug!("Ignoring malformed message from {}: {}", url, e),
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            // Dropping the senders ends every waiter on this relay
            pending_confirmations.lock().await.clear();
            subscriptions.lock().await.clear();
        });

        *outgoing_slot = Some(out_tx);
        {
            let mut tasks = self.tasks.lock().await;
            for task in tasks.drain(..) {
                task.abort();
            }
            tasks.push(writer);
            tasks.push(reader);
        }
        *self.state.write().await = ConnectionState::Connected;

        info!("Connected to relay: {}", self.url);
        Ok(())
    }

    /// Disconnect from the relay
    pub async fn disconnect(&self) {
        let mut outgoing = self.outgoing.lock().await;
        // Dropping the sender lets the writer close the socket
        outgoing.take();
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.pending_confirmations.lock().await.clear();
        self.subscriptions.lock().await.clear();
        *self.state.write().await = ConnectionState::Disconnected;
        info!("Disconnected from relay: {}", self.url);
    }

    async fn sender(&self) -> Result<mpsc::UnboundedSender<Outgoing>> {
        if !self.is_connected().await {
            return Err(ClientError::NotConnected);
        }
        self.outgoing
            .lock()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)
    }

    /// Hand a message to the writer and wait until it is on the socket.
    async fn send_message(&self, message: &ClientMessage) -> Result<()> {
        let text = message.to_json()?;
        let (ack_tx, ack_rx) = oneshot::channel();
        self.sender()
            .await?
            .send(Outgoing {
                text,
                ack: Some(ack_tx),
            })
            .map_err(|_| ClientError::NotConnected)?;
        ack_rx.await.map_err(|_| ClientError::NotConnected)?
    }

    /// Publish an event and wait for the relay's `OK`.
    pub async fn publish_event(&self, event: &Event) -> Result<PublishConfirmation> {
        let (tx, rx) = oneshot::channel();
        let event_id = event.id.clone();

        self.pending_confirmations
            .lock()
            .await
            .insert(event_id.clone(), tx);

        if let Err(e) = self.send_message(&ClientMessage::Event(event.clone())).await {
            self.pending_confirmations.lock().await.remove(&event_id);
            return Err(e);
        }
        debug!("EVENT {} sent to {}", event_id, self.url);

        match timeout(self.config.publish_timeout, rx).await {
            Ok(Ok(confirmation)) => Ok(confirmation),
            Ok(Err(_)) => Err(ClientError::PublishFailed(format!(
                "{} disconnected before confirming",
                self.url
            ))),
            Err(_) => {
                self.pending_confirmations.lock().await.remove(&event_id);
                Err(ClientError::Timeout(format!(
                    "Event confirmation timeout after {:?}",
                    self.config.publish_timeout
                )))
            }
        }
    }

    /// Register `sender` for `subscription_id` and send the `REQ`.
    ///
    /// Returns once the `REQ` frame has been written to the socket.
    pub async fn subscribe(
        &self,
        subscription_id: &str,
        filter: Filter,
        sender: SubscriptionSender,
    ) -> Result<()> {
        self.subscriptions
            .lock()
            .await
            .insert(subscription_id.to_string(), sender);

        let req = ClientMessage::Req {
            subscription_id: subscription_id.to_string(),
            filters: vec![filter],
        };
        if let Err(e) = self.send_message(&req).await {
            self.subscriptions.lock().await.remove(subscription_id);
            return Err(e);
        }
        debug!("REQ {} sent to {}", subscription_id, self.url);
        Ok(())
    }

    pub(crate) async fn close_handle(&self) -> Option<CloseHandle> {
        self.outgoing.lock().await.clone().map(|outgoing| CloseHandle {
            url: self.url.to_string(),
            outgoing,
            subscriptions: Arc::clone(&self.subscriptions),
        })
    }

    /// Number of subscriptions still routed on this connection.
    pub async fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().await.len()
    }
}

async fn route_message(
    url: &str,
    message: RelayMessage,
    pending_confirmations: &Mutex<HashMap<String, ConfirmationSender>>,
    subscriptions: &Mutex<HashMap<String, SubscriptionSender>>,
) {
    let (subscription_id, delivery, finished) = match message {
        RelayMessage::Ok {
            event_id,
            success,
            message,
        } => {
            if let Some(tx) = pending_confirmations.lock().await.remove(&event_id) {
                let _ = tx.send(PublishConfirmation {
                    relay_url: url.to_string(),
                    event_id,
                    accepted: success,
                    message,
                });
            }
            return;
        }
        RelayMessage::Notice { message } => {
            warn!("NOTICE from {}: {}", url, message);
            return;
        }
        RelayMessage::Event {
            subscription_id,
            event,
        } => (
            subscription_id,
            SubscriptionMessage::Event {
                relay_url: url.to_string(),
                event,
            },
            false,
        ),
        RelayMessage::Eose { subscription_id } => (
            subscription_id,
            SubscriptionMessage::Eose {
                relay_url: url.to_string(),
            },
            false,
        ),
        RelayMessage::Closed {
            subscription_id,
            message,
        } => {
            debug!("Relay {} closed subscription {}: {}", url, subscription_id, message);
            (
                subscription_id,
                SubscriptionMessage::Closed {
                    relay_url: url.to_string(),
                    message,
                },
                true,
            )
        }
    };

    let mut subs = subscriptions.lock().await;
    if let Some(tx) = subs.get(&subscription_id) {
        // A closed receiver means the handle was dropped
        if tx.send(delivery).is_err() || finished {
            debug!("Removing subscription {} on {}", subscription_id, url);
            subs.remove(&subscription_id);
        }
    }
}
