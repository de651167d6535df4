//! Frame types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Request identifier reserved for liveness probes.
///
/// Caller identifiers are generated as `req-<seq>-<uuid>` and can never
/// collide with it.
pub const HEARTBEAT_REQUEST_ID: &str = "__heartbeat__";

/// Tool the heartbeat probe invokes on the remote host.
pub const HEARTBEAT_TOOL: &str = "echo";

/// A frame sent from the client to the remote host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Correlation identifier echoed back by the host
    pub request_id: String,
    /// Name of the tool to invoke
    pub tool: String,
    /// Tool parameters, always a JSON object
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Whether the caller wants token-streamed output
    #[serde(default)]
    pub stream: bool,
    /// Identity of the calling agent
    #[serde(default)]
    pub agent: String,
    /// Emotional context tag forwarded with every request
    #[serde(default)]
    pub emotion: String,
}

impl OutboundFrame {
    /// Create a unary frame with an empty identity.
    pub fn new(
        request_id: impl Into<String>,
        tool: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            tool: tool.into(),
            parameters,
            stream: false,
            agent: String::new(),
            emotion: String::new(),
        }
    }

    /// Set the streaming flag.
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Attach the caller identity.
    pub fn with_identity(mut self, agent: impl Into<String>, emotion: impl Into<String>) -> Self {
        self.agent = agent.into();
        self.emotion = emotion.into();
        self
    }

    /// The liveness probe: `echo` with `{"message": "ping"}` under the
    /// reserved identifier.
    pub fn heartbeat(agent: impl Into<String>, emotion: impl Into<String>) -> Self {
        let mut parameters = Map::new();
        parameters.insert("message".to_string(), json!("ping"));
        Self::new(HEARTBEAT_REQUEST_ID, HEARTBEAT_TOOL, parameters).with_identity(agent, emotion)
    }

    /// Whether this frame carries the reserved heartbeat identifier.
    pub fn is_heartbeat(&self) -> bool {
        self.request_id == HEARTBEAT_REQUEST_ID
    }
}

/// Payload of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// Final result of a unary request
    Result(Value),
    /// Tool failure, terminal for unary and streamed requests
    Error(String),
    /// One streamed token
    Token(String),
    /// End-of-stream marker
    End,
}

impl FrameBody {
    /// The discriminant of this body.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Result(_) => FrameKind::Result,
            Self::Error(_) => FrameKind::Error,
            Self::Token(_) => FrameKind::Token,
            Self::End => FrameKind::End,
        }
    }
}

/// Discriminant of [`FrameBody`], used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `result`
    Result,
    /// `error`
    Error,
    /// `token`
    Token,
    /// `end`
    End,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Result => write!(f, "result"),
            Self::Error => write!(f, "error"),
            Self::Token => write!(f, "token"),
            Self::End => write!(f, "end"),
        }
    }
}

/// A decoded frame received from the remote host.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Correlation identifier
    pub request_id: String,
    /// Discriminated payload
    pub body: FrameBody,
}

impl InboundFrame {
    /// Create a frame from its parts.
    pub fn new(request_id: impl Into<String>, body: FrameBody) -> Self {
        Self {
            request_id: request_id.into(),
            body,
        }
    }

    /// A `result` frame.
    pub fn result(request_id: impl Into<String>, value: Value) -> Self {
        Self::new(request_id, FrameBody::Result(value))
    }

    /// An `error` frame.
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(request_id, FrameBody::Error(message.into()))
    }

    /// A `token` frame.
    pub fn token(request_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(request_id, FrameBody::Token(content.into()))
    }

    /// An `end` frame.
    pub fn end(request_id: impl Into<String>) -> Self {
        Self::new(request_id, FrameBody::End)
    }

    /// Whether this frame answers a heartbeat probe.
    pub fn is_heartbeat(&self) -> bool {
        self.request_id == HEARTBEAT_REQUEST_ID
    }

    /// Whether this frame completes the request it addresses.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.body, FrameBody::Token(_))
    }

    /// The JSON shape the remote host puts on the wire for this frame.
    pub fn to_value(&self) -> Value {
        match &self.body {
            FrameBody::Result(value) => json!({ "request_id": self.request_id, "result": value }),
            FrameBody::Error(message) => json!({ "request_id": self.request_id, "error": message }),
            FrameBody::Token(content) => {
                json!({ "request_id": self.request_id, "type": "token", "content": content })
            }
            FrameBody::End => json!({ "request_id": self.request_id, "type": "end" }),
        }
    }
}
