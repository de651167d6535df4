//! Inbound routing
//!
//! One reader task per open connection pulls messages off the transport and
//! fully routes each before reading the next. Nothing in here may end the
//! loop except a transport error.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::task::JoinHandle;
use toolrelay_transport::{Transport, TransportMessage};
use toolrelay_wire::{CodecError, HEARTBEAT_REQUEST_ID, InboundFrame};
use tracing::{debug, error, trace, warn};

use super::core::ClientInner;
use super::correlator::Routed;
use crate::events::ClientEvent;

pub(crate) fn spawn_reader<T: Transport + 'static>(
    inner: &Arc<ClientInner<T>>,
    generation: u64,
) -> JoinHandle<()> {
    let transport = Arc::clone(&inner.transport);
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        debug!(generation, "reader started");
        loop {
            let received = transport.receive().await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match received {
                Ok(message) => inner.route_message(&message),
                Err(error) => {
                    inner.handle_connection_lost(generation, &error);
                    return;
                }
            }
        }
    })
}

impl<T: Transport + 'static> ClientInner<T> {
    fn route_message(&self, message: &TransportMessage) {
        let text = match message.as_text() {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, size = message.size(), "discarding non-text message");
                return;
            }
        };

        let frame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(error) => {
                self.on_decode_error(&error);
                return;
            }
        };

        if frame.is_heartbeat() {
            self.on_heartbeat_reply();
            return;
        }

        self.events.emit(&ClientEvent::Message(frame.clone()));
        self.dispatch(frame);
    }

    fn on_decode_error(&self, error: &CodecError) {
        if error.request_id() == Some(HEARTBEAT_REQUEST_ID) {
            trace!(%error, "heartbeat reply failed to decode");
            self.on_heartbeat_reply();
            return;
        }
        warn!(request_id = ?error.request_id(), %error, "discarding malformed frame");
    }

    fn dispatch(&self, frame: InboundFrame) {
        let request_id = frame.request_id.clone();
        let kind = frame.body.kind();

        match self.pending.route(frame) {
            Routed::Orphan => {
                warn!(request_id = %request_id, %kind, "no pending request for frame");
            }
            Routed::Mismatch { expected } => {
                warn!(
                    request_id = %request_id,
                    %kind,
                    ?expected,
                    "frame does not fit pending request, discarded"
                );
            }
            Routed::Token { on_token, content } => {
                if catch_unwind(AssertUnwindSafe(|| on_token(&content))).is_err() {
                    error!(request_id = %request_id, "token callback panicked");
                }
            }
            Routed::Completed { usage, elapsed } => {
                debug!(request_id = %request_id, %kind, ?elapsed, "request completed");
                if let Some((tool, parameters)) = usage {
                    let invocation = self.tracker.record(&tool, parameters);
                    self.events.emit(&ClientEvent::ToolInvoked(invocation));
                }
            }
            Routed::Failed { tool, message } => {
                debug!(request_id = %request_id, tool = %tool, %message, "tool reported failure");
            }
        }
    }
}
