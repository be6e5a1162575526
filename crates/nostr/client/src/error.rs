//! Client error types

use thiserror::Error;

/// Client error type
#[derive(Error, Debug)]
pub enum ClientError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Malformed relay message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Subscription error
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected to relay")]
    NotConnected,

    /// Event publish failed
    #[error("Event publish failed: {0}")]
    PublishFailed(String),

    /// No relay in the request could be reached
    #[error("No relay reachable: {0}")]
    NoRelays(String),
}

impl From<crate::message::MessageError> for ClientError {
    fn from(err: crate::message::MessageError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;
