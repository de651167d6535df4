//! # toolrelay client
//!
//! An async client for remote tool hosts. It opens one connection, registers
//! the agent, discovers the available tools and multiplexes any number of
//! concurrent invocations over that connection.
//!
//! ## Features
//!
//! - **Request correlation**: every call gets a unique identifier, replies
//!   may arrive in any order
//! - **Token streaming**: `invoke_stream` delivers tokens to a callback as
//!   they arrive
//! - **Heartbeats**: periodic probes measure round-trip latency
//! - **Reconnection**: bounded, fixed-delay retries after unexpected closes
//! - **Events**: typed [`ClientEvent`]s for connection changes, latency,
//!   tool discovery and completed invocations
//! - **Usage tracking**: per-tool counters and the last invocation
//!
//! ## Example
//!
//! ```rust,no_run
//! use toolrelay_client::{Client, ClientConfig, ClientEvent, EventKind};
//! use serde_json::json;
//!
//! # async fn example() -> toolrelay_client::ClientResult<()> {
//! let config = ClientConfig::new("ws://localhost:8765").with_identity("planner", "curious");
//! let client = Client::websocket(config)?;
//!
//! client.on(EventKind::Latency, |event| {
//!     if let ClientEvent::Latency(latency) = event {
//!         println!("round trip {latency:?}");
//!     }
//! });
//!
//! let result = client.invoke("search", json!({"query": "tokio"})).await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod tools;
pub mod tracker;

pub use client::{
    Client, ClientStatus, ConnectionState, HeartbeatMonitor, ReconnectPolicy, StreamSummary,
};
pub use config::{
    ClientConfig, ConfigError, HandshakeConfig, HeartbeatConfig, IdentityConfig, ReconnectConfig,
};
pub use error::{ClientError, ClientResult};
pub use events::{ClientEvent, EventBus, EventKind, ListenerId};
pub use tools::ToolDescriptor;
pub use tracker::{ToolInvocation, ToolUsage, ToolUsageTracker};

pub use toolrelay_transport::{
    ChannelPeer, ChannelTransport, Transport, TransportError, TransportState, WebSocketTransport,
    channel_pair,
};
pub use toolrelay_wire::{FrameBody, FrameCodec, InboundFrame, OutboundFrame};
