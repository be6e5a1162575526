//! Engine configuration.
//!
//! Stored as camelCase JSON, every field optional. The NWC pairing URI may
//! be supplied through the file or `ZAPS_NWC_URI` but is never serialized
//! back out.

use crate::error::{Result, ZapError};
use nostr_client::DEFAULT_RELAYS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_RELAYS: &str = "ZAPS_RELAYS";
pub const ENV_NWC_URI: &str = "ZAPS_NWC_URI";
pub const ENV_WALLET_TIMEOUT_SECS: &str = "ZAPS_WALLET_TIMEOUT_SECS";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ZapsConfig {
    /// Relays queried for comments and receipts
    #[serde(default = "default_relays")]
    pub relays: Vec<String>,

    /// Hex pubkey every zap request is addressed to
    #[serde(default)]
    pub recipient_pubkey: Option<String>,

    /// Relay the payment processor publishes receipts to
    #[serde(default = "default_receipt_relay")]
    pub receipt_relay: String,

    /// Base URL from which feed and publisher guids are derived
    #[serde(default)]
    pub feed_base_url: Option<String>,

    /// Only labels authored by this key are trusted
    #[serde(default)]
    pub label_curator: Option<String>,

    /// Authors whose events never reach a comment feed
    #[serde(default)]
    pub blocked_pubkeys: Vec<String>,

    /// Hostnames stripped from comment text
    #[serde(default)]
    pub platform_hosts: Vec<String>,

    /// Replacement for a non-zap comment that cleans down to nothing
    #[serde(default = "default_fallback_comment")]
    pub fallback_comment: String,

    #[serde(default = "default_wallet_timeout_secs")]
    pub wallet_timeout_secs: u64,

    #[serde(default = "default_publish_delay_millis")]
    pub publish_delay_millis: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    #[serde(default = "default_comment_limit")]
    pub comment_limit: u64,

    /// LNURL-pay callback used to turn a zap request into an invoice
    #[serde(default)]
    pub lnurl_callback: Option<String>,

    #[serde(default, skip_serializing)]
    pub nwc_uri: Option<String>,
}

fn default_relays() -> Vec<String> {
    DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect()
}

fn default_receipt_relay() -> String {
    DEFAULT_RELAYS[0].to_string()
}

fn default_fallback_comment() -> String {
    "Shared this on Nostr".to_string()
}

fn default_wallet_timeout_secs() -> u64 {
    10
}

fn default_publish_delay_millis() -> u64 {
    1000
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_poll_attempts() -> u32 {
    30
}

fn default_comment_limit() -> u64 {
    50
}

impl Default for ZapsConfig {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            recipient_pubkey: None,
            receipt_relay: default_receipt_relay(),
            feed_base_url: None,
            label_curator: None,
            blocked_pubkeys: Vec::new(),
            platform_hosts: Vec::new(),
            fallback_comment: default_fallback_comment(),
            wallet_timeout_secs: default_wallet_timeout_secs(),
            publish_delay_millis: default_publish_delay_millis(),
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: default_max_poll_attempts(),
            comment_limit: default_comment_limit(),
            lnurl_callback: None,
            nwc_uri: None,
        }
    }
}

impl std::fmt::Debug for ZapsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZapsConfig")
            .field("relays", &self.relays)
            .field("recipient_pubkey", &self.recipient_pubkey)
            .field("receipt_relay", &self.receipt_relay)
            .field("feed_base_url", &self.feed_base_url)
            .field("label_curator", &self.label_curator)
            .field("blocked_pubkeys", &self.blocked_pubkeys)
            .field("platform_hosts", &self.platform_hosts)
            .field("wallet_timeout_secs", &self.wallet_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("nwc_uri", &self.nwc_uri.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl ZapsConfig {
    pub fn wallet_timeout(&self) -> Duration {
        Duration::from_secs(self.wallet_timeout_secs)
    }

    pub fn publish_delay(&self) -> Duration {
        Duration::from_millis(self.publish_delay_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Apply `ZAPS_*` overrides from the process environment.
    pub fn from_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `ZAPS_*` overrides from an arbitrary variable lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(relays) = lookup(ENV_RELAYS) {
            let relays: Vec<String> = relays
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
            if !relays.is_empty() {
                self.relays = relays;
            }
        }

        if let Some(uri) = lookup(ENV_NWC_URI).filter(|u| !u.trim().is_empty()) {
            self.nwc_uri = Some(uri);
        }

        if let Some(secs) = lookup(ENV_WALLET_TIMEOUT_SECS) {
            self.wallet_timeout_secs = secs.trim().parse().map_err(|_| {
                ZapError::Config(format!(
                    "{} must be a number of seconds, got {:?}",
                    ENV_WALLET_TIMEOUT_SECS, secs
                ))
            })?;
        }

        Ok(self)
    }
}

/// `~/.config/zaps/config.json`
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ZapError::Config("could not determine config directory".to_string()))?;
    Ok(config_dir.join("zaps").join("config.json"))
}

/// Load config from `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: &Path) -> Result<ZapsConfig> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(ZapsConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ZapError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| ZapError::Config(format!("failed to parse {}: {}", path.display(), e)))
}
