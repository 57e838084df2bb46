//! Error taxonomy for the live update client.
//!
//! - [`ClientError::Configuration`]: caller programming error, never retried
//! - [`ClientError::Transport`]: handshake failure or session drop, drives the retry path
//! - [`ClientError::Decode`]: one inbound frame was not JSON, frame dropped
//! - [`ClientError::NotConnected`]: `send()` outside `CONNECTED`, reported by return value
//!
//! None of these terminate the host process.

use thiserror::Error;

/// Transport-level failure (socket, handshake, broker `ERROR` frame).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{context}: {detail}")]
pub struct TransportError {
    /// Where the failure happened (e.g. `"handshake"`, `"read"`).
    pub context: String,
    /// Failure detail from the underlying layer.
    pub detail: String,
}

impl TransportError {
    /// Create a transport error.
    #[must_use]
    pub fn new(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

/// An inbound frame body that is not well-formed JSON.
#[derive(Debug, Error)]
#[error("failed to decode frame body on {topic}: {source}")]
pub struct DecodeError {
    /// Topic the frame arrived on.
    pub topic: String,
    /// Underlying parse error.
    #[source]
    pub source: serde_json::Error,
}

/// Top-level client error.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Required configuration missing or malformed (e.g. empty resource ID).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Handshake failure or mid-session drop.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Inbound frame body could not be decoded.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// Outbound payload could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// Operation requires `CONNECTED`.
    #[error("not connected (status: {status})")]
    NotConnected {
        /// Status at the time of the call.
        status: crate::status::ConnectionStatus,
    },

    /// The connection manager task has stopped.
    #[error("connection manager is closed")]
    Closed,
}

/// Coarse classification used for logging and retry decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller must fix input and re-invoke.
    Configuration,
    /// Recoverable by reconnecting.
    Transport,
    /// Recoverable per frame.
    Decode,
    /// API used in the wrong state.
    ProtocolMisuse,
    /// Manager task gone.
    Closed,
}

impl ClientError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Encode(_) | Self::NotConnected { .. } => ErrorKind::ProtocolMisuse,
            Self::Closed => ErrorKind::Closed,
        }
    }

    /// Whether the automatic retry path applies.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}
