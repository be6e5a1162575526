//! Error types for the zaps engine.

use nostr::{ErrorCode, Nip47Error};
use nostr_client::ClientError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZapError {
    /// Malformed event template or key material; never retried
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Ciphertext did not decrypt under the expected shared secret
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Wallet response decrypted but is not a valid NIP-47 payload
    #[error("malformed wallet response: {0}")]
    MalformedResponse(String),

    #[error("no wallet response within {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Aborted,

    #[error("invoice not settled after {attempts} attempts")]
    MaxAttemptsExceeded { attempts: u32 },

    #[error("malformed zap receipt {id}: {reason}")]
    MalformedReceipt { id: String, reason: String },

    #[error("relay error: {0}")]
    Transport(#[from] ClientError),

    #[error("wallet error {code}: {message}")]
    Wallet { code: ErrorCode, message: String },

    #[error("invoice error: {0}")]
    Invoice(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ZapError {
    /// Whether a settlement lookup that failed this way should simply be tried again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ZapError::Timeout(_) | ZapError::Transport(_) => true,
            ZapError::Wallet { code, .. } => matches!(
                code,
                ErrorCode::NotFound | ErrorCode::RateLimited | ErrorCode::Internal
            ),
            _ => false,
        }
    }
}

/// Wallet error objects keep their code; anything else the wallet sent is malformed.
impl From<Nip47Error> for ZapError {
    fn from(err: Nip47Error) -> Self {
        match err {
            Nip47Error::Wallet(error) => ZapError::Wallet {
                code: error.code,
                message: error.message,
            },
            Nip47Error::InvalidUri(msg) => ZapError::Config(msg),
            other => ZapError::MalformedResponse(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ZapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ZapError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(ZapError::Transport(ClientError::NotConnected).is_retryable());
        assert!(
            ZapError::Wallet {
                code: ErrorCode::RateLimited,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !ZapError::Wallet {
                code: ErrorCode::Unauthorized,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!ZapError::Decryption("bad padding".into()).is_retryable());
        assert!(!ZapError::Encoding("bad key".into()).is_retryable());
        assert!(!ZapError::Aborted.is_retryable());
    }
}
