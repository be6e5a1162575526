//! Zaps and comments for podcast content over Nostr.
//!
//! - [`ZapRequestBuilder`]: signed kind 9734 zap requests tagged with the
//!   item, feed and publisher guids of the content being paid for
//! - [`NwcClient`]: one encrypted Nostr Wallet Connect round trip per call
//! - [`SettlementPoller`]: fixed-interval `lookup_invoice` polling with cancellation
//! - [`CommentFeed`]: notes, zap receipts and curator labels merged into one feed
//! - [`ZapFlow`]: zap request, invoice, payment and settlement in one call
//!
//! Every component takes its [`RelayTransport`](nostr_client::RelayTransport)
//! explicitly, so tests can run against a stub.

pub mod comments;
pub mod config;
pub mod error;
pub mod invoice;
pub mod nwc;
pub mod settlement;
pub mod signer;
pub mod zap_request;

pub use comments::{Comment, CommentFeed, CommentFeedConfig, ContentCleaner};
pub use config::{ZapsConfig, default_config_path, load_config};
pub use error::{Result, ZapError};
pub use invoice::{Invoice, InvoiceIssuer, LnurlInvoiceIssuer, ZapFlow, ZapOutcome};
pub use nwc::{NwcClient, NwcConfig, NwcConnection, PendingRequest, ResponseListener};
pub use settlement::{InvoiceLookup, PollConfig, SettlementPoller, Sleeper, TokioSleeper};
pub use signer::{Signer, decrypt_from_peer, encrypt_to_peer};
pub use zap_request::{ParentContent, ParentKind, ZapRequestBuilder, ZapRequestParams};
