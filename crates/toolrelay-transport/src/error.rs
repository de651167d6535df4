//! Transport error types.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer closed the connection.
    #[error("Connection closed{}: {reason}", code.map(|c| format!(" ({c})")).unwrap_or_default())]
    ConnectionClosed {
        /// Close code sent by the peer, if any
        code: Option<u16>,
        /// Close reason sent by the peer
        reason: String,
    },

    /// An established connection was lost without a close handshake.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Failed to send a message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a message.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// The operation requires an open connection.
    #[error("Transport is not connected")]
    NotConnected,

    /// A message exceeded the configured size limit.
    #[error("Message too large: {size} bytes exceeds limit of {max} bytes")]
    MessageTooLarge {
        /// Actual size in bytes
        size: usize,
        /// Configured limit in bytes
        max: usize,
    },

    /// The transport was configured incorrectly.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Connection establishment did not finish in time.
    #[error("Connection timed out after {timeout:?}")]
    ConnectionTimeout {
        /// The timeout that was exceeded
        timeout: Duration,
    },
}

impl TransportError {
    /// Close code and reason to report for this error when it ends a
    /// connection.
    pub fn close_details(&self) -> (Option<u16>, String) {
        match self {
            Self::ConnectionClosed { code, reason } => (*code, reason.clone()),
            other => (None, other.to_string()),
        }
    }

    /// Whether the peer closed the connection deliberately.
    pub const fn is_close(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_details_prefer_peer_values() {
        let closed = TransportError::ConnectionClosed {
            code: Some(1001),
            reason: "going away".into(),
        };
        assert_eq!(closed.close_details(), (Some(1001), "going away".to_string()));
        assert!(closed.is_close());

        let lost = TransportError::ConnectionLost("reset by peer".into());
        assert_eq!(lost.close_details().0, None);
        assert!(lost.close_details().1.contains("reset by peer"));
        assert!(!lost.is_close());
    }

    #[test]
    fn display_includes_code() {
        let closed = TransportError::ConnectionClosed {
            code: Some(1000),
            reason: "bye".into(),
        };
        assert_eq!(closed.to_string(), "Connection closed (1000): bye");
    }
}
