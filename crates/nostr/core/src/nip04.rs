//! NIP-04: Encrypted payloads.
//!
//! The shared secret is the x coordinate of the ECDH point between the local
//! secret key and the peer's x-only public key. Plaintext is encrypted with
//! AES-256-CBC (PKCS#7 padding) under a random 16-byte IV and carried as
//! `base64(ciphertext)?iv=base64(iv)`.
//!
//! Wallet services speak this scheme for NIP-47 requests and responses.

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bitcoin::secp256k1::ecdh::shared_secret_point;
use bitcoin::secp256k1::{PublicKey, SecretKey};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_SEPARATOR: &str = "?iv=";

/// Errors that can occur during NIP-04 encryption or decryption.
#[derive(Debug, Error)]
pub enum Nip04Error {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decryption failed: bad padding or wrong shared secret")]
    BadPadding,

    #[error("plaintext is not valid utf-8")]
    InvalidUtf8,
}

fn shared_key(secret_key: &[u8; 32], peer_pubkey: &[u8; 32]) -> Result<[u8; 32], Nip04Error> {
    let sk = SecretKey::from_slice(secret_key)
        .map_err(|e| Nip04Error::InvalidSecretKey(e.to_string()))?;
    let pk = PublicKey::from_slice(&[&[0x02], peer_pubkey.as_slice()].concat())
        .map_err(|e| Nip04Error::InvalidPublicKey(e.to_string()))?;

    let point = shared_secret_point(&pk, &sk);
    let mut key = [0u8; 32];
    key.copy_from_slice(&point[..32]);
    Ok(key)
}

/// Encrypt `plaintext` for `peer_pubkey` (x-only, 32 bytes).
pub fn encrypt(
    secret_key: &[u8; 32],
    peer_pubkey: &[u8; 32],
    plaintext: &str,
) -> Result<String, Nip04Error> {
    let key = shared_key(secret_key, peer_pubkey)?;

    let mut iv = [0u8; 16];
    rand::rng().fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new(key.as_slice().into(), iv.as_slice().into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(format!(
        "{}{}{}",
        STANDARD.encode(ciphertext),
        IV_SEPARATOR,
        STANDARD.encode(iv)
    ))
}

/// Decrypt a payload produced by [`encrypt`] (or any NIP-04 implementation).
pub fn decrypt(
    secret_key: &[u8; 32],
    peer_pubkey: &[u8; 32],
    payload: &str,
) -> Result<String, Nip04Error> {
    let (ciphertext_b64, iv_b64) = payload
        .split_once(IV_SEPARATOR)
        .ok_or_else(|| Nip04Error::MalformedPayload("missing ?iv= separator".to_string()))?;

    let ciphertext = STANDARD.decode(ciphertext_b64)?;
    let iv = STANDARD.decode(iv_b64)?;
    if iv.len() != 16 {
        return Err(Nip04Error::MalformedPayload(format!(
            "iv must be 16 bytes, got {}",
            iv.len()
        )));
    }
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(Nip04Error::MalformedPayload(format!(
            "ciphertext length {} is not a positive multiple of the block size",
            ciphertext.len()
        )));
    }

    let key = shared_key(secret_key, peer_pubkey)?;
    let plaintext = Aes256CbcDec::new(key.as_slice().into(), iv.as_slice().into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| Nip04Error::BadPadding)?;

    String::from_utf8(plaintext).map_err(|_| Nip04Error::InvalidUtf8)
}
