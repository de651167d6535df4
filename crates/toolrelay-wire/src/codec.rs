//! JSON frame codec.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::frame::{FrameBody, InboundFrame, OutboundFrame};

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors produced while encoding or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// Serialization of an outbound frame failed.
    #[error("Encode failed: {0}")]
    Encode(String),

    /// The payload is not valid JSON.
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// The payload is JSON but not a valid frame.
    #[error("Invalid frame{}: {reason}", request_id.as_deref().map(|id| format!(" for {id}")).unwrap_or_default())]
    Invalid {
        /// Identifier of the offending frame, when it could be read
        request_id: Option<String>,
        /// What was wrong with it
        reason: String,
    },
}

impl CodecError {
    fn invalid(request_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            request_id: request_id.map(ToString::to_string),
            reason: reason.into(),
        }
    }

    /// Identifier of the frame that failed to decode, if it had one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Invalid { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }
}

/// Stateless JSON codec for toolrelay frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a codec.
    pub const fn new() -> Self {
        Self
    }

    /// Encode an outbound frame to JSON text.
    pub fn encode(&self, frame: &OutboundFrame) -> CodecResult<String> {
        serde_json::to_string(frame).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Encode an inbound frame the way a host would send it.
    pub fn encode_inbound(&self, frame: &InboundFrame) -> CodecResult<String> {
        serde_json::to_string(&frame.to_value()).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Decode an outbound frame, as a host receiving client traffic would.
    pub fn decode_outbound(&self, text: &str) -> CodecResult<OutboundFrame> {
        serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    /// Decode and validate an inbound frame.
    pub fn decode(&self, text: &str) -> CodecResult<InboundFrame> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(CodecError::invalid(None, "frame is not a JSON object"));
        };

        let request_id = match object.remove("request_id") {
            Some(Value::String(id)) => id,
            Some(_) => return Err(CodecError::invalid(None, "request_id is not a string")),
            None => return Err(CodecError::invalid(None, "missing request_id")),
        };

        let body = decode_body(&request_id, &mut object)?;
        Ok(InboundFrame { request_id, body })
    }
}

fn decode_body(request_id: &str, object: &mut Map<String, Value>) -> CodecResult<FrameBody> {
    match object.remove("error") {
        None | Some(Value::Null) => {}
        Some(Value::String(message)) => return Ok(FrameBody::Error(message)),
        Some(other) => return Ok(FrameBody::Error(other.to_string())),
    }

    match object.remove("type") {
        None | Some(Value::Null) => {}
        Some(Value::String(kind)) => {
            return match kind.as_str() {
                "token" => match object.remove("content") {
                    Some(Value::String(content)) => Ok(FrameBody::Token(content)),
                    _ => Err(CodecError::invalid(
                        Some(request_id),
                        "token frame without string content",
                    )),
                },
                "end" => Ok(FrameBody::End),
                other => Err(CodecError::invalid(
                    Some(request_id),
                    format!("unknown frame type '{other}'"),
                )),
            };
        }
        Some(_) => {
            return Err(CodecError::invalid(
                Some(request_id),
                "frame type is not a string",
            ));
        }
    }

    match object.remove("result") {
        Some(value) => Ok(FrameBody::Result(value)),
        None => Err(CodecError::invalid(
            Some(request_id),
            "frame carries no result, error or stream marker",
        )),
    }
}
