//! Settlement polling.
//!
//! Payment processors give us no push channel, so settlement is found by
//! asking the wallet about the invoice on a fixed cadence (5 s, 30 attempts
//! by default). Wallet relays rate-limit aggressively; the interval does not
//! back off.

use crate::config::ZapsConfig;
use crate::error::{Result, ZapError};
use crate::nwc::{NwcClient, NwcConnection};
use async_trait::async_trait;
use nostr::Transaction;
use nostr_client::RelayTransport;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timer used between polls.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A single `lookup_invoice` round trip.
#[async_trait]
pub trait InvoiceLookup: Send + Sync {
    async fn lookup_invoice(
        &self,
        connection: &NwcConnection,
        invoice: &str,
    ) -> Result<Transaction>;
}

#[async_trait]
impl<T: RelayTransport> InvoiceLookup for NwcClient<T> {
    async fn lookup_invoice(
        &self,
        connection: &NwcConnection,
        invoice: &str,
    ) -> Result<Transaction> {
        NwcClient::lookup_invoice(self, connection, invoice).await
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 30,
        }
    }
}

impl From<&ZapsConfig> for PollConfig {
    fn from(config: &ZapsConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
        }
    }
}

pub struct SettlementPoller<L: InvoiceLookup, S: Sleeper = TokioSleeper> {
    lookup: L,
    sleeper: S,
    config: PollConfig,
}

impl<L: InvoiceLookup> SettlementPoller<L, TokioSleeper> {
    pub fn new(lookup: L) -> Self {
        Self::with_sleeper(lookup, TokioSleeper, PollConfig::default())
    }
}

impl<L: InvoiceLookup, S: Sleeper> SettlementPoller<L, S> {
    pub fn with_sleeper(lookup: L, sleeper: S, config: PollConfig) -> Self {
        Self {
            lookup,
            sleeper,
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll until the wallet reports `invoice` settled.
    ///
    /// A result that reports settlement is returned even when `cancel` fired
    /// while the lookup was in flight. Cancellation is otherwise honored
    /// before each attempt and during the wait between attempts.
    ///
    /// Timeouts, transport failures and transient wallet errors count as
    /// "not settled yet"; any other failure ends the poll.
    pub async fn await_settlement(
        &self,
        connection: &NwcConnection,
        invoice: &str,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                info!("Settlement poll cancelled before attempt {}", attempt);
                return Err(ZapError::Aborted);
            }

            match self.lookup.lookup_invoice(connection, invoice).await {
                Ok(transaction) if transaction.is_settled() => {
                    info!(
                        "Invoice {} settled after {} attempt(s)",
                        transaction.payment_hash, attempt
                    );
                    return Ok(transaction);
                }
                Ok(_) => debug!("Invoice not settled yet ({}/{})", attempt, max_attempts),
                Err(e) if e.is_retryable() => {
                    warn!("Settlement lookup attempt {}/{} failed: {}", attempt, max_attempts, e);
                }
                Err(e) => return Err(e),
            }

            if attempt == max_attempts {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Settlement poll cancelled while waiting");
                    return Err(ZapError::Aborted);
                }
                _ = self.sleeper.sleep(self.config.interval) => {}
            }
        }

        Err(ZapError::MaxAttemptsExceeded {
            attempts: max_attempts,
        })
    }
}
