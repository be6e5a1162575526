//! NIP-21: `nostr:` URI scheme.

use crate::nip19::{Nip19Entity, Nip19Error, decode};
use thiserror::Error;

/// The URI scheme prefix, including the colon.
pub const NOSTR_URI_SCHEME: &str = "nostr:";

#[derive(Debug, Error)]
pub enum Nip21Error {
    #[error("missing nostr: scheme")]
    MissingScheme,

    #[error(transparent)]
    Nip19(#[from] Nip19Error),
}

/// Check for the `nostr:` prefix without decoding the entity.
pub fn is_nostr_uri(value: &str) -> bool {
    value.starts_with(NOSTR_URI_SCHEME)
}

/// Decode a `nostr:<bech32>` URI.
pub fn from_nostr_uri(uri: &str) -> Result<Nip19Entity, Nip21Error> {
    let encoded = uri
        .strip_prefix(NOSTR_URI_SCHEME)
        .ok_or(Nip21Error::MissingScheme)?;
    Ok(decode(encoded)?)
}

/// Wrap a bech32 entity string as a `nostr:` URI.
pub fn to_nostr_uri(encoded: &str) -> String {
    format!("{}{}", NOSTR_URI_SCHEME, encoded)
}
