//! In-memory transport pair.
//!
//! [`ChannelTransport`] is the client side; [`ChannelPeer`] plays the remote
//! host. Every `connect` opens a fresh inbound link, so a peer can close the
//! connection and observe the client reconnecting.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tracing::{debug, trace};

use crate::error::{TransportError, TransportResult};
use crate::message::TransportMessage;
use crate::traits::Transport;
use crate::types::{TransportState, TransportType};

#[derive(Debug)]
enum Inbound {
    Message(TransportMessage),
    Close { code: Option<u16>, reason: String },
}

#[derive(Debug)]
struct Link {
    to_client: parking_lot::Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
    to_peer: mpsc::UnboundedSender<TransportMessage>,
    connects: watch::Sender<u32>,
    refuse_connects: AtomicU32,
    refuse_all: AtomicBool,
    fail_sends: AtomicBool,
}

/// Create a connected-on-demand transport and the peer that drives it.
pub fn channel_pair() -> (ChannelTransport, ChannelPeer) {
    let (to_peer, from_client) = mpsc::unbounded_channel();
    let (connects, _) = watch::channel(0);
    let link = Arc::new(Link {
        to_client: parking_lot::Mutex::new(None),
        to_peer,
        connects,
        refuse_connects: AtomicU32::new(0),
        refuse_all: AtomicBool::new(false),
        fail_sends: AtomicBool::new(false),
    });

    let transport = ChannelTransport {
        link: Arc::clone(&link),
        inbound: Mutex::new(None),
        state: RwLock::new(TransportState::Disconnected),
    };
    let peer = ChannelPeer {
        link,
        from_client: Arc::new(Mutex::new(from_client)),
    };
    (transport, peer)
}

/// Client half of an in-memory transport pair.
#[derive(Debug)]
pub struct ChannelTransport {
    link: Arc<Link>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    state: RwLock<TransportState>,
}

impl Transport for ChannelTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Channel
    }

    fn state(&self) -> Pin<Box<dyn Future<Output = TransportState> + Send + '_>> {
        Box::pin(async move { self.state.read().await.clone() })
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            let refused = self.link.refuse_all.load(Ordering::SeqCst)
                || self
                    .link
                    .refuse_connects
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if refused {
                *self.state.write().await = TransportState::Failed {
                    reason: "peer refused connection".into(),
                };
                return Err(TransportError::ConnectionFailed(
                    "peer refused connection".into(),
                ));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            *self.link.to_client.lock() = Some(tx);
            *self.inbound.lock().await = Some(rx);
            *self.state.write().await = TransportState::Connected;
            self.link.connects.send_modify(|n| *n += 1);

            debug!("Channel transport connected");
            Ok(())
        })
    }

    fn disconnect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.link.to_client.lock().take();
            self.inbound.lock().await.take();
            *self.state.write().await = TransportState::Disconnected;
            debug!("Channel transport disconnected");
            Ok(())
        })
    }

    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if !matches!(*self.state.read().await, TransportState::Connected) {
                return Err(TransportError::NotConnected);
            }
            if self.link.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed("peer rejected message".into()));
            }
            self.link
                .to_peer
                .send(message)
                .map_err(|_| TransportError::SendFailed("peer dropped".into()))
        })
    }

    fn receive(&self) -> Pin<Box<dyn Future<Output = TransportResult<TransportMessage>> + Send + '_>> {
        Box::pin(async move {
            let next = {
                let mut guard = self.inbound.lock().await;
                let Some(rx) = guard.as_mut() else {
                    return Err(TransportError::NotConnected);
                };
                rx.recv().await
            };

            match next {
                Some(Inbound::Message(message)) => {
                    trace!("Channel transport received {} bytes", message.size());
                    Ok(message)
                }
                Some(Inbound::Close { code, reason }) => {
                    *self.state.write().await = TransportState::Disconnected;
                    Err(TransportError::ConnectionClosed { code, reason })
                }
                None => {
                    *self.state.write().await = TransportState::Disconnected;
                    Err(TransportError::ConnectionClosed {
                        code: None,
                        reason: "peer hung up".into(),
                    })
                }
            }
        })
    }

    fn endpoint(&self) -> Option<String> {
        Some("channel://peer".to_string())
    }
}

/// Remote-host half of an in-memory transport pair.
///
/// Cloning a peer shares the same link.
#[derive(Debug, Clone)]
pub struct ChannelPeer {
    link: Arc<Link>,
    from_client: Arc<Mutex<mpsc::UnboundedReceiver<TransportMessage>>>,
}

impl ChannelPeer {
    /// Deliver a text message to the client. Returns `false` when no
    /// connection is open.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        let to_client = self.link.to_client.lock().clone();
        to_client.is_some_and(|tx| tx.send(Inbound::Message(TransportMessage::text(text))).is_ok())
    }

    /// Deliver a JSON value to the client.
    pub fn send_json(&self, value: &Value) -> bool {
        self.send_text(value.to_string())
    }

    /// Close the current connection with a close code and reason.
    pub fn close(&self, code: Option<u16>, reason: impl Into<String>) -> bool {
        let to_client = self.link.to_client.lock().take();
        to_client.is_some_and(|tx| {
            tx.send(Inbound::Close {
                code,
                reason: reason.into(),
            })
            .is_ok()
        })
    }

    /// Next message sent by the client.
    pub async fn recv(&self) -> Option<TransportMessage> {
        self.from_client.lock().await.recv().await
    }

    /// Next message sent by the client, parsed as JSON.
    pub async fn recv_json(&self) -> Option<Value> {
        let message = self.recv().await?;
        serde_json::from_slice(&message.payload).ok()
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next_connects(&self, n: u32) {
        self.link.refuse_connects.store(n, Ordering::SeqCst);
    }

    /// Refuse every connection attempt until reset.
    pub fn refuse_all_connects(&self, refuse: bool) {
        self.link.refuse_all.store(refuse, Ordering::SeqCst);
    }

    /// Make client sends fail until reset.
    pub fn fail_sends(&self, fail: bool) {
        self.link.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Number of successful connections so far.
    pub fn connect_count(&self) -> u32 {
        *self.link.connects.borrow()
    }

    /// Wait until at least `n` connections have been opened.
    pub async fn wait_for_connects(&self, n: u32) {
        let mut rx = self.link.connects.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Whether a connection is currently open.
    pub fn is_linked(&self) -> bool {
        self.link.to_client.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn messages_flow_both_ways() {
        let (transport, peer) = channel_pair();
        transport.connect().await.unwrap();
        assert_eq!(peer.connect_count(), 1);

        transport
            .send(TransportMessage::text(r#"{"tool":"echo"}"#))
            .await
            .unwrap();
        assert_eq!(peer.recv_json().await, Some(json!({"tool": "echo"})));

        assert!(peer.send_json(&json!({"request_id": "a", "result": 1})));
        let message = transport.receive().await.unwrap();
        assert_eq!(message.as_text().unwrap(), r#"{"request_id":"a","result":1}"#);
    }

    #[tokio::test]
    async fn peer_close_surfaces_code() {
        let (transport, peer) = channel_pair();
        transport.connect().await.unwrap();
        assert!(peer.close(Some(1001), "going away"));
        assert_eq!(
            transport.receive().await,
            Err(TransportError::ConnectionClosed {
                code: Some(1001),
                reason: "going away".into()
            })
        );
        assert_eq!(transport.state().await, TransportState::Disconnected);
        assert!(!peer.is_linked());
    }

    #[tokio::test]
    async fn refused_connects_are_counted_down() {
        let (transport, peer) = channel_pair();
        peer.refuse_next_connects(2);
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_ok());
        assert_eq!(peer.connect_count(), 1);
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let (transport, peer) = channel_pair();
        assert_eq!(
            transport.send(TransportMessage::text("{}")).await,
            Err(TransportError::NotConnected)
        );
        transport.connect().await.unwrap();
        peer.fail_sends(true);
        assert!(matches!(
            transport.send(TransportMessage::text("{}")).await,
            Err(TransportError::SendFailed(_))
        ));
    }

    #[tokio::test]
    async fn reconnect_opens_fresh_link() {
        let (transport, peer) = channel_pair();
        transport.connect().await.unwrap();
        peer.close(None, "restart");
        assert!(transport.receive().await.is_err());

        transport.connect().await.unwrap();
        peer.wait_for_connects(2).await;
        assert!(peer.send_text("{}"));
        assert!(transport.receive().await.is_ok());
    }
}
