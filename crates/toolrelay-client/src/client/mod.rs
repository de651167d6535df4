//! Client implementation
//!
//! - `core`: `Client<T>` handle and shared state
//! - `connection`: state machine, reconnect policy, shared connect attempts
//! - `correlator`: identifiers and the pending-request table
//! - `stream`: token-streamed invocations
//! - `dispatcher`: the reader task and inbound routing
//! - `heartbeat`: liveness probe and latency
//! - `handshake`: registration and tool discovery

mod connection;
mod core;
mod correlator;
mod dispatcher;
mod handshake;
mod heartbeat;
mod stream;

pub use connection::{ConnectionState, ReconnectPolicy};
pub use core::{Client, ClientStatus};
pub use heartbeat::HeartbeatMonitor;
pub use stream::StreamSummary;
