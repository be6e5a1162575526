//! Event signing and peer encryption.

use crate::error::{Result, ZapError};
use nostr::{Event, EventTemplate, finalize_event, generate_secret_key, get_public_key_hex};
use std::fmt;

/// Who signs outgoing events.
#[derive(Clone)]
pub enum Signer {
    /// A persistent identity key
    Identity([u8; 32]),
    /// A fresh throwaway key per event
    Anonymous,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signer::Identity(_) => f.write_str("Signer::Identity(<redacted>)"),
            Signer::Anonymous => f.write_str("Signer::Anonymous"),
        }
    }
}

impl Signer {
    /// Identity pubkey, or `None` for anonymous signing.
    pub fn public_key_hex(&self) -> Result<Option<String>> {
        match self {
            Signer::Identity(secret) => get_public_key_hex(secret)
                .map(Some)
                .map_err(|e| ZapError::Encoding(e.to_string())),
            Signer::Anonymous => Ok(None),
        }
    }

    pub fn sign(&self, template: &EventTemplate) -> Result<Event> {
        let secret = match self {
            Signer::Identity(secret) => *secret,
            Signer::Anonymous => generate_secret_key(),
        };
        finalize_event(template, &secret).map_err(|e| ZapError::Encoding(e.to_string()))
    }
}

fn peer_key(peer_pubkey: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(peer_pubkey)
        .map_err(|e| ZapError::Encoding(format!("peer pubkey {}: {}", peer_pubkey, e)))?;
    bytes
        .try_into()
        .map_err(|_| ZapError::Encoding(format!("peer pubkey {} is not 32 bytes", peer_pubkey)))
}

/// Encrypt `plaintext` to the hex-encoded `peer_pubkey`.
pub fn encrypt_to_peer(secret: &[u8; 32], peer_pubkey: &str, plaintext: &str) -> Result<String> {
    nostr::encrypt(secret, &peer_key(peer_pubkey)?, plaintext)
        .map_err(|e| ZapError::Encoding(e.to_string()))
}

/// Decrypt a payload the hex-encoded `peer_pubkey` encrypted to us.
pub fn decrypt_from_peer(secret: &[u8; 32], peer_pubkey: &str, ciphertext: &str) -> Result<String> {
    nostr::decrypt(secret, &peer_key(peer_pubkey)?, ciphertext)
        .map_err(|e| ZapError::Decryption(e.to_string()))
}
