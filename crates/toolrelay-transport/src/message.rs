//! Transport message type.

use bytes::Bytes;

use crate::error::{TransportError, TransportResult};

/// A single message carried by a transport.
///
/// Frames are JSON text; binary payloads are accepted when they hold UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// The raw payload.
    pub payload: Bytes,
}

impl TransportMessage {
    /// Creates a message from raw bytes.
    pub const fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Creates a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: Bytes::from(text.into()),
        }
    }

    /// Returns the size of the payload in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Borrows the payload as UTF-8 text.
    pub fn as_text(&self) -> TransportResult<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| TransportError::ReceiveFailed(format!("payload is not UTF-8: {e}")))
    }
}

impl From<String> for TransportMessage {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<&str> for TransportMessage {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trip() {
        let message = TransportMessage::from("{\"request_id\":\"a\"}");
        assert_eq!(message.size(), 18);
        assert_eq!(message.as_text().unwrap(), "{\"request_id\":\"a\"}");
    }

    #[test]
    fn rejects_invalid_utf8() {
        let message = TransportMessage::new(Bytes::from_static(&[0xff, 0xfe]));
        assert!(matches!(
            message.as_text(),
            Err(TransportError::ReceiveFailed(_))
        ));
    }
}
