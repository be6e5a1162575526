//! Subscription ids and EOSE bookkeeping for multi-relay queries.

use std::collections::HashSet;
use uuid::Uuid;

/// Generate a unique subscription ID.
pub fn generate_subscription_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Tracks which relays have finished sending stored events for a query.
#[derive(Debug, Clone)]
pub struct EoseTracker {
    pending: HashSet<String>,
}

impl EoseTracker {
    pub fn new(relays: impl IntoIterator<Item = String>) -> Self {
        Self {
            pending: relays.into_iter().collect(),
        }
    }

    /// Record EOSE (or CLOSED) from a relay.
    pub fn finish(&mut self, relay_url: &str) {
        self.pending.remove(relay_url);
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_subscription_id() {
        let id1 = generate_subscription_id();
        let id2 = generate_subscription_id();

        assert_eq!(id1.len(), 16);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_eose_tracker() {
        let mut tracker = EoseTracker::new(vec!["wss://a".to_string(), "wss://b".to_string()]);
        assert!(!tracker.is_complete());

        tracker.finish("wss://a");
        tracker.finish("wss://unknown");
        assert_eq!(tracker.pending().collect::<Vec<_>>(), vec!["wss://b"]);

        tracker.finish("wss://b");
        assert!(tracker.is_complete());
    }

    #[test]
    fn test_empty_tracker_is_complete() {
        assert!(EoseTracker::new(Vec::new()).is_complete());
    }
}
