//! # toolrelay transport
//!
//! The [`Transport`] trait the toolrelay client talks through, plus two
//! implementations:
//!
//! - [`WebSocketTransport`]: a `tokio-tungstenite` client connection
//! - [`ChannelTransport`] / [`ChannelPeer`]: an in-memory pair where the peer
//!   plays the remote tool host, used by tests and embedders
//!
//! ```rust
//! use toolrelay_transport::{Transport, TransportMessage, channel_pair};
//!
//! # tokio_test::block_on(async {
//! let (transport, peer) = channel_pair();
//! transport.connect().await?;
//! transport.send(TransportMessage::text(r#"{"tool":"echo"}"#)).await?;
//! assert!(peer.recv().await.is_some());
//! # Ok::<(), toolrelay_transport::TransportError>(())
//! # });
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

pub mod channel;
pub mod error;
pub mod message;
pub mod traits;
pub mod types;
pub mod websocket;

pub use channel::{ChannelPeer, ChannelTransport, channel_pair};
pub use error::{TransportError, TransportResult};
pub use message::TransportMessage;
pub use traits::Transport;
pub use types::{TransportState, TransportType};
pub use websocket::{WebSocketConfig, WebSocketTransport};
