//! Relay pool: the production [`RelayTransport`].
//!
//! Connections are opened lazily the first time a relay URL is used and
//! reused for every later call.

use crate::error::{ClientError, Result};
use crate::message::Filter;
use crate::relay::{RelayConfig, RelayConnection};
use crate::subscription::{EoseTracker, generate_subscription_id};
use crate::transport::{PublishConfirmation, RelayTransport, Subscription, SubscriptionMessage};
use async_trait::async_trait;
use futures::future::join_all;
use nostr::Event;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub relay: RelayConfig,
    /// Upper bound on a `query_sync` call when some relay never sends EOSE
    pub query_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// A pool of Nostr relay connections.
pub struct RelayPool {
    connections: RwLock<HashMap<String, Arc<RelayConnection>>>,
    config: PoolConfig,
}

impl Default for RelayPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayPool {
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get all relay URLs in the pool.
    pub async fn relay_urls(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// Subscriptions still routed by any connection in the pool.
    pub async fn active_subscriptions(&self) -> usize {
        let conns: Vec<_> = self.connections.read().await.values().cloned().collect();
        let mut total = 0;
        for conn in conns {
            total += conn.active_subscriptions().await;
        }
        total
    }

    async fn connection(&self, url: &str) -> Result<Arc<RelayConnection>> {
        let existing = self.connections.read().await.get(url).cloned();
        let conn = match existing {
            Some(conn) => conn,
            None => {
                let mut conns = self.connections.write().await;
                match conns.get(url) {
                    Some(conn) => Arc::clone(conn),
                    None => {
                        let conn = Arc::new(RelayConnection::with_config(
                            url,
                            self.config.relay.clone(),
                        )?);
                        conns.insert(url.to_string(), Arc::clone(&conn));
                        conn
                    }
                }
            }
        };
        conn.connect().await?;
        Ok(conn)
    }

    /// Connect to every relay in parallel, keeping the ones that answered.
    async fn connect_all(&self, relays: &[String]) -> Result<Vec<Arc<RelayConnection>>> {
        let unique: Vec<&String> = {
            let mut seen = HashSet::new();
            relays.iter().filter(|r| seen.insert(r.as_str())).collect()
        };

        let results = join_all(unique.iter().map(|url| self.connection(url))).await;

        let mut connected = Vec::new();
        let mut errors = Vec::new();
        for (url, result) in unique.iter().zip(results) {
            match result {
                Ok(conn) => connected.push(conn),
                Err(e) => {
                    warn!("Relay {} unavailable: {}", url, e);
                    errors.push(format!("{}: {}", url, e));
                }
            }
        }

        if connected.is_empty() {
            return Err(ClientError::NoRelays(if errors.is_empty() {
                "no relays given".to_string()
            } else {
                errors.join("; ")
            }));
        }
        Ok(connected)
    }

    async fn open_subscription(
        &self,
        relays: &[String],
        filter: Filter,
    ) -> Result<(Subscription, Vec<String>)> {
        let connections = self.connect_all(relays).await?;
        let subscription_id = generate_subscription_id();
        let (tx, rx) = mpsc::unbounded_channel();

        let results = join_all(
            connections
                .iter()
                .map(|conn| conn.subscribe(&subscription_id, filter.clone(), tx.clone())),
        )
        .await;
        drop(tx);

        let mut subscribed = Vec::new();
        let mut close_handles = Vec::new();
        for (conn, result) in connections.iter().zip(results) {
            match result {
                Ok(()) => {
                    subscribed.push(conn.url().to_string());
                    if let Some(handle) = conn.close_handle().await {
                        close_handles.push(handle);
                    }
                }
                Err(e) => warn!("REQ {} failed on {}: {}", subscription_id, conn.url(), e),
            }
        }

        if subscribed.is_empty() {
            return Err(ClientError::Subscription(format!(
                "no relay accepted subscription {}",
                subscription_id
            )));
        }

        debug!("Subscription {} open on {} relays", subscription_id, subscribed.len());
        let subscription = Subscription::new(subscription_id, rx).on_close(move |id| {
            for handle in &close_handles {
                handle.close(id);
            }
        });
        Ok((subscription, subscribed))
    }

    /// Disconnect every relay and forget the connections.
    pub async fn disconnect_all(&self) {
        let conns: Vec<_> = self.connections.write().await.drain().collect();
        for (url, conn) in conns {
            conn.disconnect().await;
            debug!("Dropped relay {}", url);
        }
    }
}

#[async_trait]
impl RelayTransport for RelayPool {
    async fn publish(&self, relays: &[String], event: &Event) -> Result<Vec<PublishConfirmation>> {
        let connections = self.connect_all(relays).await?;
        let results = join_all(connections.iter().map(|conn| conn.publish_event(event))).await;

        let mut confirmations = Vec::new();
        let mut errors = Vec::new();
        for (conn, result) in connections.iter().zip(results) {
            match result {
                Ok(confirmation) => {
                    if !confirmation.accepted {
                        warn!(
                            "Relay {} rejected {}: {}",
                            conn.url(),
                            event.id,
                            confirmation.message
                        );
                    }
                    confirmations.push(confirmation);
                }
                Err(e) => {
                    warn!("Publish of {} to {} failed: {}", event.id, conn.url(), e);
                    errors.push(e.to_string());
                }
            }
        }

        if confirmations.is_empty() {
            return Err(ClientError::PublishFailed(errors.join("; ")));
        }
        info!(
            "Published {} to {}/{} relays",
            event.id,
            confirmations.iter().filter(|c| c.accepted).count(),
            connections.len()
        );
        Ok(confirmations)
    }

    async fn query_sync(&self, relays: &[String], filter: Filter) -> Result<Vec<Event>> {
        let (mut subscription, subscribed) = self.open_subscription(relays, filter).await?;
        let mut tracker = EoseTracker::new(subscribed);
        let mut seen = HashSet::new();
        let mut events = Vec::new();

        let deadline = tokio::time::Instant::now() + self.config.query_timeout;
        while !tracker.is_complete() {
            let message = match tokio::time::timeout_at(deadline, subscription.next_message()).await
            {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Query {} timed out waiting for EOSE from {:?}",
                        subscription.id(),
                        tracker.pending().collect::<Vec<_>>()
                    );
                    break;
                }
            };

            match message {
                SubscriptionMessage::Event { event, .. } => {
                    if seen.insert(event.id.clone()) {
                        events.push(event);
                    }
                }
                SubscriptionMessage::Eose { relay_url }
                | SubscriptionMessage::Closed { relay_url, .. } => tracker.finish(&relay_url),
            }
        }

        subscription.close();
        debug!("Query returned {} events", events.len());
        Ok(events)
    }

    async fn subscribe(&self, relays: &[String], filter: Filter) -> Result<Subscription> {
        let (subscription, _) = self.open_subscription(relays, filter).await?;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_pool_is_empty() {
        let pool = RelayPool::new();
        assert!(pool.relay_urls().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_relays_is_an_error() {
        let pool = RelayPool::new();
        assert!(matches!(
            pool.query_sync(&[], Filter::new()).await,
            Err(ClientError::NoRelays(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_relay_url() {
        let pool = RelayPool::new();
        let result = pool
            .subscribe(&["https://not-a-relay.example".to_string()], Filter::new())
            .await;
        assert!(matches!(result, Err(ClientError::NoRelays(msg)) if msg.contains("not-a-relay")));
    }
}
