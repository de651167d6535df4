//! WebSocket client transport.
//!
//! The stream is split once per connection; the sink and the stream halves
//! live behind separate async mutexes so a pending `receive` never blocks a
//! `send`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{TransportError, TransportResult};
use crate::message::TransportMessage;
use crate::traits::Transport;
use crate::types::{TransportState, TransportType};

type WebSocketConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Type alias for the WebSocket write half.
pub type WebSocketWriter = Arc<Mutex<Option<SplitSink<WebSocketConnection, Message>>>>;

/// Type alias for the WebSocket read half.
pub type WebSocketReader = Arc<Mutex<Option<SplitStream<WebSocketConnection>>>>;

/// Default maximum message size (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`WebSocketTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// `ws://` or `wss://` endpoint
    pub url: String,
    /// Largest message accepted in either direction
    pub max_message_size: usize,
    /// Upper bound on the opening handshake
    pub connect_timeout: Duration,
}

impl WebSocketConfig {
    /// Create a configuration for `url` with default limits.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the maximum message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Check the URL scheme and limits.
    pub fn validate(&self) -> TransportResult<()> {
        let url = Url::parse(&self.url).map_err(|e| {
            TransportError::ConfigurationError(format!("invalid url '{}': {e}", self.url))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::ConfigurationError(format!(
                "unsupported scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }
        if self.max_message_size == 0 {
            return Err(TransportError::ConfigurationError(
                "max_message_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// WebSocket client transport built on `tokio-tungstenite`.
#[derive(Debug)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
    state: Arc<RwLock<TransportState>>,
    writer: WebSocketWriter,
    reader: WebSocketReader,
    session_id: String,
}

impl WebSocketTransport {
    /// Create a disconnected transport.
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(TransportState::Disconnected)),
            writer: Arc::new(Mutex::new(None)),
            reader: Arc::new(Mutex::new(None)),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Shorthand for a transport with default limits.
    pub fn connect_to(url: impl Into<String>) -> Self {
        Self::new(WebSocketConfig::new(url))
    }

    /// The transport configuration.
    pub const fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Identifier used in log lines for this transport.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn set_state(&self, state: TransportState) {
        *self.state.write().await = state;
    }

    async fn drop_halves(&self) {
        self.writer.lock().await.take();
        self.reader.lock().await.take();
    }

    async fn mark_closed(&self) {
        // The reader half is owned by the caller of receive() at this point.
        self.writer.lock().await.take();
        self.set_state(TransportState::Disconnected).await;
    }

    fn check_size(&self, size: usize) -> TransportResult<()> {
        if size > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size,
                max: self.config.max_message_size,
            });
        }
        Ok(())
    }

    async fn answer_ping(&self, data: Bytes) {
        if let Some(ref mut writer) = *self.writer.lock().await
            && let Ok(()) = writer.send(Message::Pong(data)).await
        {
            trace!("Sent pong in session {}", self.session_id);
        }
    }
}

impl Transport for WebSocketTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::WebSocket
    }

    fn state(&self) -> Pin<Box<dyn Future<Output = TransportState> + Send + '_>> {
        Box::pin(async move { self.state.read().await.clone() })
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.config.validate()?;
            self.set_state(TransportState::Connecting).await;
            debug!(
                "Connecting to {} in session {}",
                self.config.url, self.session_id
            );

            let timeout = self.config.connect_timeout;
            let attempt = tokio::time::timeout(timeout, connect_async(self.config.url.as_str())).await;
            let stream = match attempt {
                Ok(Ok((stream, _response))) => stream,
                Ok(Err(e)) => {
                    let reason = e.to_string();
                    warn!(
                        "WebSocket connect to {} failed in session {}: {}",
                        self.config.url, self.session_id, reason
                    );
                    self.set_state(TransportState::Failed {
                        reason: reason.clone(),
                    })
                    .await;
                    return Err(TransportError::ConnectionFailed(reason));
                }
                Err(_) => {
                    self.set_state(TransportState::Failed {
                        reason: "connect timed out".into(),
                    })
                    .await;
                    return Err(TransportError::ConnectionTimeout { timeout });
                }
            };

            let (writer, reader) = stream.split();
            *self.writer.lock().await = Some(writer);
            *self.reader.lock().await = Some(reader);
            self.set_state(TransportState::Connected).await;

            info!(
                "WebSocket connected to {} in session {}",
                self.config.url, self.session_id
            );
            Ok(())
        })
    }

    fn disconnect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.set_state(TransportState::Disconnecting).await;

            if let Some(mut writer) = self.writer.lock().await.take() {
                if let Err(e) = writer.send(Message::Close(None)).await {
                    debug!(
                        "Close frame not delivered in session {}: {}",
                        self.session_id, e
                    );
                }
                let _ = writer.close().await;
            }
            self.drop_halves().await;
            self.set_state(TransportState::Disconnected).await;

            info!("WebSocket disconnected in session {}", self.session_id);
            Ok(())
        })
    }

    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.check_size(message.size())?;

            let frame = match message.as_text() {
                Ok(text) => Message::text(text.to_owned()),
                Err(_) => Message::Binary(message.payload),
            };

            let mut guard = self.writer.lock().await;
            let Some(writer) = guard.as_mut() else {
                return Err(TransportError::NotConnected);
            };
            writer
                .send(frame)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;

            trace!("Sent message in session {}", self.session_id);
            Ok(())
        })
    }

    fn receive(&self) -> Pin<Box<dyn Future<Output = TransportResult<TransportMessage>> + Send + '_>> {
        Box::pin(async move {
            loop {
                let next = {
                    let mut guard = self.reader.lock().await;
                    let Some(reader) = guard.as_mut() else {
                        return Err(TransportError::NotConnected);
                    };
                    reader.next().await
                };

                match next {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.check_size(text.len()) {
                            warn!("Dropping inbound text in session {}: {}", self.session_id, e);
                            continue;
                        }
                        return Ok(TransportMessage::new(Bytes::copy_from_slice(
                            text.as_bytes(),
                        )));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Err(e) = self.check_size(data.len()) {
                            warn!(
                                "Dropping inbound binary in session {}: {}",
                                self.session_id, e
                            );
                            continue;
                        }
                        return Ok(TransportMessage::new(data));
                    }
                    Some(Ok(Message::Ping(data))) => self.answer_ping(data).await,
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => {
                        trace!("Ignoring control frame in session {}", self.session_id);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.as_str().to_owned()))
                            .unwrap_or((None, String::new()));
                        info!(
                            "WebSocket closed by peer in session {} (code {:?})",
                            self.session_id, code
                        );
                        self.mark_closed().await;
                        return Err(TransportError::ConnectionClosed { code, reason });
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error in session {}: {}", self.session_id, e);
                        self.mark_closed().await;
                        return Err(TransportError::ConnectionLost(e.to_string()));
                    }
                    None => {
                        info!("WebSocket stream ended for session {}", self.session_id);
                        self.mark_closed().await;
                        return Err(TransportError::ConnectionClosed {
                            code: None,
                            reason: "stream ended".into(),
                        });
                    }
                }
            }
        })
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.config.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_scheme() {
        assert!(WebSocketConfig::new("ws://localhost:8765").validate().is_ok());
        assert!(WebSocketConfig::new("wss://relay.example/ws").validate().is_ok());
        assert!(matches!(
            WebSocketConfig::new("http://localhost").validate(),
            Err(TransportError::ConfigurationError(_))
        ));
        assert!(WebSocketConfig::new("not a url").validate().is_err());
        assert!(
            WebSocketConfig::new("ws://localhost")
                .with_max_message_size(0)
                .validate()
                .is_err()
        );
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let transport = WebSocketTransport::connect_to("ws://127.0.0.1:9");
        assert_eq!(transport.state().await, TransportState::Disconnected);
        assert_eq!(transport.endpoint().as_deref(), Some("ws://127.0.0.1:9"));
        assert!(matches!(
            transport.send(TransportMessage::text("{}")).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.receive().await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_send() {
        let transport =
            WebSocketTransport::new(WebSocketConfig::new("ws://127.0.0.1:9").with_max_message_size(4));
        assert_eq!(
            transport.send(TransportMessage::text("12345")).await,
            Err(TransportError::MessageTooLarge { size: 5, max: 4 })
        );
    }

    #[tokio::test]
    async fn connect_failure_marks_state() {
        let transport = WebSocketTransport::new(
            WebSocketConfig::new("ws://127.0.0.1:1").with_connect_timeout(Duration::from_secs(2)),
        );
        assert!(transport.connect().await.is_err());
        assert!(matches!(
            transport.state().await,
            TransportState::Failed { .. }
        ));
    }
}
