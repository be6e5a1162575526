//! Nostr protocol implementation for the zaps engine.
//!
//! This crate provides:
//! - NIP-01: Basic protocol (events, signing, verification)
//! - NIP-04: Encrypted payloads keyed by ECDH (requires `full` feature)
//! - NIP-19: bech32-encoded entities (`npub`, `note`, `nevent`)
//! - NIP-21: `nostr:` URI scheme
//! - NIP-27: Text note references
//! - NIP-32: Labeling
//! - NIP-47: Nostr Wallet Connect
//! - NIP-57: Lightning Zaps
//! - NIP-73: External content ids (Podcasting 2.0 guids)
//!
//! # Features
//!
//! - `full` (default): Full crypto support including key generation, signing and encryption
//! - `minimal`: Just Event type and serialization

mod nip01;
#[cfg(feature = "full")]
mod nip04;
mod nip19;
mod nip21;
mod nip27;
mod nip32;
mod nip47;
mod nip57;
mod nip73;

// NIP-01: Basic protocol (Event type always available)
pub use nip01::{
    Event, EventTemplate, KIND_METADATA, KIND_SHORT_TEXT_NOTE, Nip01Error, UnsignedEvent,
    serialize_event, sort_events, unix_now, validate_unsigned_event,
};

// NIP-01: Crypto functions (require full feature)
#[cfg(feature = "full")]
pub use nip01::{
    finalize_event, generate_secret_key, get_event_hash, get_public_key, get_public_key_hex,
    parse_secret_key_hex, validate_event, verify_event,
};

// NIP-04: Encrypted payloads (requires full feature)
#[cfg(feature = "full")]
pub use nip04::{Nip04Error, decrypt, encrypt};

// NIP-19: bech32-encoded entities
pub use nip19::{
    EventPointer, Nip19Entity, Nip19Error, decode, encode_nevent, encode_note, encode_npub,
};

// NIP-21: nostr: URI scheme
pub use nip21::{NOSTR_URI_SCHEME, Nip21Error, from_nostr_uri, is_nostr_uri, to_nostr_uri};

// NIP-27: Text note references
pub use nip27::{MentionReference, extract_event_pointer, extract_references, has_references};

// NIP-32: Labeling
pub use nip32::{LABEL_KIND, LABEL_NAMESPACE_TAG, LABEL_TAG, labeled_event_ids};

// NIP-47: Nostr Wallet Connect
pub use nip47::{
    BalanceResult, ErrorCode, ErrorResponse, INFO_EVENT_KIND, LookupInvoiceParams,
    MakeInvoiceParams, Method, Nip47Error, NwcUri, PayInvoiceParams, PayInvoiceResult,
    REQUEST_KIND, RESPONSE_KIND, Request, Response, ResponseResult, Transaction,
    TransactionType,
};

// NIP-57: Lightning Zaps
pub use nip57::{Nip57Error, ZAP_RECEIPT_KIND, ZAP_REQUEST_KIND, ZapReceipt, ZapRequest};

// NIP-73: External content ids
pub use nip73::{
    ContentReference, EXTERNAL_CONTENT_TAG, Nip73Error, PODCAST_GUID_NAMESPACE, feed_guid,
    normalize_feed_url,
};
