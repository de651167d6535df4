//! # toolrelay wire format
//!
//! Encoding and decoding of the frames exchanged between a toolrelay client
//! and the remote tool host.
//!
//! Outbound frames are plain JSON objects naming a tool and its parameters.
//! Inbound frames are decoded into a discriminated [`FrameBody`] so that the
//! router never has to poke at optional fields:
//!
//! ```rust
//! use toolrelay_wire::{FrameBody, FrameCodec};
//!
//! let codec = FrameCodec::new();
//! let frame = codec
//!     .decode(r#"{"request_id":"req-1","type":"token","content":"Hel"}"#)
//!     .unwrap();
//!
//! assert_eq!(frame.request_id, "req-1");
//! assert_eq!(frame.body, FrameBody::Token("Hel".into()));
//! ```
//!
//! Decode precedence is `error`, then `type`, then `result`. A frame that
//! fails validation still reports its `request_id` when one was present,
//! see [`CodecError::request_id`].

#![deny(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

mod codec;
mod frame;

pub use codec::{CodecError, CodecResult, FrameCodec};
pub use frame::{
    FrameBody, FrameKind, HEARTBEAT_REQUEST_ID, HEARTBEAT_TOOL, InboundFrame, OutboundFrame,
};
