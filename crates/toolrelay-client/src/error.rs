//! Client error types.

use std::time::Duration;

use thiserror::Error;
use toolrelay_transport::TransportError;
use toolrelay_wire::CodecError;

/// Result alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors surfaced to callers of the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClientError {
    /// The transport failed to open, send or stay connected.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The remote host reported a tool failure.
    #[error("Tool '{tool}' failed: {message}")]
    Tool {
        /// Tool that failed
        tool: String,
        /// Error text from the host
        message: String,
    },

    /// The per-request deadline expired before a response arrived.
    #[error("Request {request_id} timed out after {timeout:?}")]
    Timeout {
        /// Identifier of the abandoned request
        request_id: String,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// Registration or tool listing failed after the transport opened.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Parameters were not a JSON object.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The client was disconnected while the request was in flight.
    #[error("Client disconnected")]
    Disconnected,

    /// Configuration was rejected.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether retrying after a reconnect may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout { .. } | Self::Disconnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ClientError::Disconnected.is_retryable());
        assert!(ClientError::Transport(TransportError::NotConnected).is_retryable());
        assert!(
            !ClientError::Tool {
                tool: "search".into(),
                message: "bad query".into(),
            }
            .is_retryable()
        );
        assert!(!ClientError::InvalidParameters("not an object".into()).is_retryable());
    }
}
