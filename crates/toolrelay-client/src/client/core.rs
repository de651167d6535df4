//! Core client
//!
//! `Client<T>` is a cheap `Arc` handle around [`ClientInner`]. All clones
//! share one connection, one pending table, one event bus and one usage
//! tracker.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use toolrelay_transport::{Transport, WebSocketConfig, WebSocketTransport};
use toolrelay_wire::FrameCodec;

use super::connection::{ConnectAttempt, ConnectionState, LinkState, ReconnectPolicy};
use super::heartbeat::HeartbeatMonitor;
use super::stream::StreamSummary;
use crate::config::{ClientConfig, duration_millis};
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventBus, EventKind, ListenerId};
use crate::tools::ToolDescriptor;
use crate::tracker::{ToolInvocation, ToolUsage, ToolUsageTracker};

/// Shared client state.
pub(crate) struct ClientInner<T: Transport + 'static> {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Arc<T>,
    pub(crate) codec: FrameCodec,
    pub(crate) events: EventBus,
    pub(crate) tracker: ToolUsageTracker,
    pub(crate) pending: super::correlator::PendingTable,
    pub(crate) link: Mutex<LinkState>,
    pub(crate) heartbeat: Mutex<HeartbeatMonitor>,
    pub(crate) tools: RwLock<Vec<ToolDescriptor>>,
    /// In-flight connect attempt, shared by concurrent callers
    pub(crate) connecting: Mutex<Option<(u64, ConnectAttempt)>>,
    attempt_seq: AtomicU64,
}

impl<T: Transport + 'static> ClientInner<T> {
    pub(crate) fn next_attempt_id(&self) -> u64 {
        self.attempt_seq.fetch_add(1, Ordering::Relaxed)
    }
}

impl<T: Transport + 'static> Drop for ClientInner<T> {
    fn drop(&mut self) {
        // Background tasks only hold weak references; stop them with the last handle.
        for task in self.link.get_mut().take_tasks() {
            task.abort();
        }
    }
}

/// Tool-invocation client.
///
/// ```rust,no_run
/// use toolrelay_client::{Client, ClientConfig};
/// use serde_json::json;
///
/// # async fn example() -> toolrelay_client::ClientResult<()> {
/// let client = Client::websocket(ClientConfig::new("ws://localhost:8765"))?;
/// client.connect().await?;
///
/// let answer = client.invoke("search", json!({"query": "rust"})).await?;
/// println!("{answer}");
///
/// client
///     .invoke_stream("summarize", json!({"text": "..."}), |token| print!("{token}"))
///     .await?;
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct Client<T: Transport + 'static> {
    inner: Arc<ClientInner<T>>,
}

impl<T: Transport + 'static> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport + 'static> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("transport", &self.inner.transport)
            .field("pending", &self.inner.pending)
            .finish()
    }
}

impl Client<WebSocketTransport> {
    /// A client speaking WebSocket to `config.url`.
    pub fn websocket(config: ClientConfig) -> ClientResult<Self> {
        config
            .validate()
            .map_err(|error| ClientError::Config(error.to_string()))?;
        let ws_config =
            WebSocketConfig::new(config.url.clone()).with_max_message_size(config.max_message_size);
        ws_config
            .validate()
            .map_err(|error| ClientError::Config(error.to_string()))?;
        Ok(Self::new(config, WebSocketTransport::new(ws_config)))
    }
}

impl<T: Transport + 'static> Client<T> {
    /// A client over an existing transport. Nothing is opened until
    /// [`connect`](Self::connect) or the first invocation.
    ///
    /// ```rust
    /// use toolrelay_client::{Client, ClientConfig, channel_pair};
    ///
    /// # tokio_test::block_on(async {
    /// let (transport, _host) = channel_pair();
    /// let config = ClientConfig::new("channel://host")
    ///     .without_handshake()
    ///     .without_heartbeat();
    /// let client = Client::new(config, transport);
    ///
    /// client.connect().await?;
    /// assert!(client.is_connected());
    /// assert!(client.disconnect().await);
    /// # Ok::<(), toolrelay_client::ClientError>(())
    /// # }).unwrap();
    /// ```
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let policy = ReconnectPolicy::from_config(&config.reconnect);
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport: Arc::new(transport),
                codec: FrameCodec::new(),
                events: EventBus::new(),
                tracker: ToolUsageTracker::new(),
                pending: super::correlator::PendingTable::default(),
                link: Mutex::new(LinkState::new(policy)),
                heartbeat: Mutex::new(HeartbeatMonitor::default()),
                tools: RwLock::new(Vec::new()),
                connecting: Mutex::new(None),
                attempt_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Transport the client drives.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Open the transport and run the handshake.
    ///
    /// Concurrent callers share one attempt. Resolves immediately when
    /// already connected.
    pub async fn connect(&self) -> ClientResult<()> {
        self.inner.connect().await
    }

    /// Close the connection, cancel any scheduled reconnect and fail every
    /// pending request with [`ClientError::Disconnected`]. Returns `false`
    /// when nothing was connected.
    pub async fn disconnect(&self) -> bool {
        self.inner.disconnect().await
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Whether the connection is open and handshaken.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Invoke `tool` and wait for its result, connecting first if needed.
    ///
    /// Uses the configured request timeout, if any.
    pub async fn invoke(&self, tool: &str, parameters: Value) -> ClientResult<Value> {
        self.inner
            .invoke(tool, parameters, self.inner.config.request_timeout())
            .await
    }

    /// [`invoke`](Self::invoke) with an explicit deadline.
    pub async fn invoke_with_timeout(
        &self,
        tool: &str,
        parameters: Value,
        timeout: Duration,
    ) -> ClientResult<Value> {
        self.inner.invoke(tool, parameters, Some(timeout)).await
    }

    /// Invoke `tool` with streamed output. `on_token` runs on the reader task
    /// for every token, in arrival order.
    pub async fn invoke_stream<F>(
        &self,
        tool: &str,
        parameters: Value,
        on_token: F,
    ) -> ClientResult<StreamSummary>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner
            .invoke_stream(
                tool,
                parameters,
                Arc::new(on_token),
                self.inner.config.request_timeout(),
            )
            .await
    }

    /// [`invoke_stream`](Self::invoke_stream) with an explicit deadline.
    pub async fn invoke_stream_with_timeout<F>(
        &self,
        tool: &str,
        parameters: Value,
        timeout: Duration,
        on_token: F,
    ) -> ClientResult<StreamSummary>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner
            .invoke_stream(tool, parameters, Arc::new(on_token), Some(timeout))
            .await
    }

    /// Ask the host for its tools again.
    pub async fn refresh_tools(&self) -> ClientResult<Vec<ToolDescriptor>> {
        self.inner.ensure_connected().await?;
        self.inner
            .fetch_tools(Some(self.inner.config.handshake.timeout()))
            .await
    }

    /// Tools from the most recent listing.
    pub fn available_tools(&self) -> Vec<ToolDescriptor> {
        self.inner.tools.read().clone()
    }

    /// Subscribe to one kind of event.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    /// Unsubscribe a listener.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.events.off(kind, id)
    }

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// The usage tracker.
    pub fn tracker(&self) -> &ToolUsageTracker {
        &self.inner.tracker
    }

    /// Requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Reconnect attempts consumed since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.link.lock().policy.attempts()
    }

    /// Last measured heartbeat round trip.
    pub fn latency(&self) -> Option<Duration> {
        self.inner.latency()
    }

    /// A serializable snapshot of the client.
    pub fn status(&self) -> ClientStatus {
        let state = self.state();
        ClientStatus {
            connected: state == ConnectionState::Connected,
            state,
            latency_ms: self
                .latency()
                .map(duration_millis),
            reconnect_attempts: self.reconnect_attempts(),
            active_tools: self.inner.tools.read().len(),
            pending_requests: self.pending_requests(),
            last_tool_used: self.inner.tracker.last_invocation(),
            tool_usage: self.inner.tracker.snapshot(),
        }
    }
}

/// Point-in-time view of a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStatus {
    /// Whether the connection is open
    pub connected: bool,
    /// Connection state
    pub state: ConnectionState,
    /// Last heartbeat round trip in milliseconds
    pub latency_ms: Option<u64>,
    /// Reconnect attempts consumed
    pub reconnect_attempts: u32,
    /// Number of available tools
    pub active_tools: usize,
    /// Requests waiting for a response
    pub pending_requests: usize,
    /// Most recent successful invocation
    pub last_tool_used: Option<ToolInvocation>,
    /// Per-tool counts
    pub tool_usage: Vec<ToolUsage>,
}
