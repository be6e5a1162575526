//! Nostr relay transport.
//!
//! This crate provides:
//! - Message parsing (NIP-01 relay protocol) and subscription filters
//! - The [`RelayTransport`] capability consumed by the zaps engine
//! - [`RelayPool`], a WebSocket implementation with lazily opened connections
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr_client::{Filter, RelayPool, RelayTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nostr_client::ClientError> {
//!     let pool = RelayPool::new();
//!     let relays = vec!["wss://relay.damus.io".to_string()];
//!
//!     let filter = Filter::new()
//!         .kinds(vec![9735])
//!         .content_refs(vec!["podcast:item:guid:abc-123".to_string()])
//!         .limit(20);
//!     for event in pool.query_sync(&relays, filter).await? {
//!         println!("receipt {}", event.id);
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod message;
mod pool;
mod relay;
mod subscription;
mod transport;

pub use error::{ClientError, Result};
pub use message::{ClientMessage, Filter, MessageError, RelayMessage};
pub use pool::{PoolConfig, RelayPool};
pub use relay::{ConnectionState, RelayConfig, RelayConnection};
pub use subscription::{EoseTracker, generate_subscription_id};
pub use transport::{PublishConfirmation, RelayTransport, Subscription, SubscriptionMessage};

/// Relays used when no configuration names any.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.primal.net",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_relays() {
        assert!(!DEFAULT_RELAYS.is_empty());
        for relay in DEFAULT_RELAYS {
            assert!(relay.starts_with("wss://"));
        }
    }
}
