//! Request correlation
//!
//! Every caller request gets a fresh identifier and a pending entry holding
//! the oneshot that completes it. Identifier generation and insertion happen
//! under one lock, so no two in-flight requests ever share an identifier.
//! Entries leave the table exactly once: on a terminal frame, on their
//! deadline, when the caller drops the request, or on `disconnect`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;
use toolrelay_transport::{Transport, TransportMessage};
use toolrelay_wire::{FrameBody, InboundFrame, OutboundFrame};
use tracing::{trace, warn};
use uuid::Uuid;

use super::core::ClientInner;
use super::stream::StreamSummary;
use crate::error::{ClientError, ClientResult};

/// Callback receiving streamed tokens.
pub(crate) type TokenCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Which frames a pending entry accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingKind {
    Unary,
    Stream,
}

pub(crate) enum Completion {
    Unary(oneshot::Sender<ClientResult<Value>>),
    Stream {
        on_token: TokenCallback,
        tokens: usize,
        done: oneshot::Sender<ClientResult<StreamSummary>>,
    },
}

impl Completion {
    const fn kind(&self) -> PendingKind {
        match self {
            Self::Unary(_) => PendingKind::Unary,
            Self::Stream { .. } => PendingKind::Stream,
        }
    }

    fn accepts(&self, body: &FrameBody) -> bool {
        matches!(
            (self, body),
            (_, FrameBody::Error(_))
                | (Self::Unary(_), FrameBody::Result(_))
                | (Self::Stream { .. }, FrameBody::Token(_) | FrameBody::End)
        )
    }

    fn fail(self, error: ClientError) -> bool {
        match self {
            Self::Unary(tx) => tx.send(Err(error)).is_ok(),
            Self::Stream { done, .. } => done.send(Err(error)).is_ok(),
        }
    }
}

struct PendingRequest {
    tool: String,
    parameters: Map<String, Value>,
    created_at: Instant,
    track: bool,
    completion: Completion,
}

impl PendingRequest {
    fn finish(self, request_id: &str, body: FrameBody) -> Routed {
        let Self {
            tool,
            parameters,
            created_at,
            track,
            completion,
        } = self;
        let elapsed = created_at.elapsed();

        let delivered = match (body, completion) {
            (FrameBody::Error(message), completion) => {
                completion.fail(ClientError::Tool {
                    tool: tool.clone(),
                    message: message.clone(),
                });
                return Routed::Failed { tool, message };
            }
            (FrameBody::Result(value), Completion::Unary(tx)) => tx.send(Ok(value)).is_ok(),
            (FrameBody::End, Completion::Stream { done, tokens, .. }) => done
                .send(Ok(StreamSummary {
                    request_id: request_id.to_string(),
                    tokens,
                }))
                .is_ok(),
            // `accepts` rules this out before the entry is removed.
            (body, completion) => {
                let message = format!("unexpected {} frame", body.kind());
                completion.fail(ClientError::Tool {
                    tool: tool.clone(),
                    message: message.clone(),
                });
                return Routed::Failed { tool, message };
            }
        };

        let usage = (track && delivered).then_some((tool, parameters));
        Routed::Completed { usage, elapsed }
    }
}

/// What routing a frame asks the dispatcher to do once the lock is released.
pub(crate) enum Routed {
    /// No entry for the identifier
    Orphan,
    /// Entry exists but cannot take this frame kind
    Mismatch { expected: PendingKind },
    /// Deliver a token to the stream callback
    Token {
        on_token: TokenCallback,
        content: String,
    },
    /// Entry completed successfully; `usage` is set for tracked requests
    Completed {
        usage: Option<(String, Map<String, Value>)>,
        elapsed: Duration,
    },
    /// Entry failed with a tool error
    Failed { tool: String, message: String },
}

#[derive(Default)]
struct PendingEntries {
    next_sequence: u64,
    entries: HashMap<String, PendingRequest>,
}

/// The pending-request table.
#[derive(Default)]
pub(crate) struct PendingTable {
    inner: Mutex<PendingEntries>,
}

impl std::fmt::Debug for PendingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTable")
            .field("len", &self.len())
            .finish()
    }
}

impl PendingTable {
    fn register(
        &self,
        tool: &str,
        parameters: Map<String, Value>,
        track: bool,
        completion: Completion,
    ) -> String {
        let mut inner = self.inner.lock();
        inner.next_sequence += 1;
        let request_id = format!("req-{}-{}", inner.next_sequence, Uuid::new_v4().simple());
        inner.entries.insert(
            request_id.clone(),
            PendingRequest {
                tool: tool.to_string(),
                parameters,
                created_at: Instant::now(),
                track,
                completion,
            },
        );
        request_id
    }

    pub(crate) fn register_unary(
        &self,
        tool: &str,
        parameters: Map<String, Value>,
        track: bool,
    ) -> (String, oneshot::Receiver<ClientResult<Value>>) {
        let (tx, rx) = oneshot::channel();
        let request_id = self.register(tool, parameters, track, Completion::Unary(tx));
        (request_id, rx)
    }

    pub(crate) fn register_stream(
        &self,
        tool: &str,
        parameters: Map<String, Value>,
        on_token: TokenCallback,
    ) -> (String, oneshot::Receiver<ClientResult<StreamSummary>>) {
        let (done, rx) = oneshot::channel();
        let completion = Completion::Stream {
            on_token,
            tokens: 0,
            done,
        };
        let request_id = self.register(tool, parameters, true, completion);
        (request_id, rx)
    }

    pub(crate) fn remove(&self, request_id: &str) -> bool {
        self.inner.lock().entries.remove(request_id).is_some()
    }

    pub(crate) fn contains(&self, request_id: &str) -> bool {
        self.inner.lock().entries.contains_key(request_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Fail and remove every entry.
    pub(crate) fn fail_all(&self, error: &ClientError) -> usize {
        let drained: Vec<PendingRequest> = self.inner.lock().entries.drain().map(|(_, p)| p).collect();
        let count = drained.len();
        for pending in drained {
            pending.completion.fail(error.clone());
        }
        count
    }

    /// Fail and remove internal (untracked) entries, leaving caller requests.
    pub(crate) fn fail_untracked(&self, error: &ClientError) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut inner = self.inner.lock();
            let ids: Vec<String> = inner
                .entries
                .iter()
                .filter(|(_, pending)| !pending.track)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| inner.entries.remove(id))
                .collect()
        };
        let count = drained.len();
        for pending in drained {
            pending.completion.fail(error.clone());
        }
        count
    }

    /// Match a frame to its entry.
    pub(crate) fn route(&self, frame: InboundFrame) -> Routed {
        let mut inner = self.inner.lock();
        let Some(pending) = inner.entries.get_mut(&frame.request_id) else {
            return Routed::Orphan;
        };

        if !pending.completion.accepts(&frame.body) {
            return Routed::Mismatch {
                expected: pending.completion.kind(),
            };
        }

        if let (FrameBody::Token(content), Completion::Stream { on_token, tokens, .. }) =
            (&frame.body, &mut pending.completion)
        {
            *tokens += 1;
            return Routed::Token {
                on_token: Arc::clone(on_token),
                content: content.clone(),
            };
        }

        let removed = inner.entries.remove(&frame.request_id);
        drop(inner);
        match removed {
            Some(pending) => pending.finish(&frame.request_id, frame.body),
            None => Routed::Orphan,
        }
    }
}

/// Removes its entry when the awaiting caller goes away.
pub(crate) struct PendingGuard<'a> {
    table: &'a PendingTable,
    request_id: String,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(table: &'a PendingTable, request_id: &str) -> Self {
        Self {
            table,
            request_id: request_id.to_string(),
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.remove(&self.request_id) {
            trace!(request_id = %self.request_id, "pending request abandoned");
        }
    }
}

/// Accept an object, treat `null` as `{}`, reject anything else.
pub(crate) fn object_parameters(parameters: Value) -> ClientResult<Map<String, Value>> {
    match parameters {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ClientError::InvalidParameters(format!(
            "parameters must be a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Wait for a completion, honouring an optional deadline.
pub(crate) async fn await_completion<R>(
    completion: oneshot::Receiver<ClientResult<R>>,
    request_id: &str,
    deadline: Option<Duration>,
) -> ClientResult<R> {
    let outcome = match deadline {
        Some(timeout) => match tokio::time::timeout(timeout, completion).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(request_id, ?timeout, "request deadline expired");
                return Err(ClientError::Timeout {
                    request_id: request_id.to_string(),
                    timeout,
                });
            }
        },
        None => completion.await,
    };
    outcome.unwrap_or(Err(ClientError::Disconnected))
}

impl<T: Transport + 'static> ClientInner<T> {
    pub(crate) fn frame_for(
        &self,
        request_id: &str,
        tool: &str,
        parameters: Map<String, Value>,
        stream: bool,
    ) -> OutboundFrame {
        let identity = &self.config.identity;
        OutboundFrame::new(request_id, tool, parameters)
            .streaming(stream)
            .with_identity(identity.agent.as_str(), identity.emotion.as_str())
    }

    pub(crate) async fn send_frame(&self, frame: &OutboundFrame) -> ClientResult<()> {
        let text = self.codec.encode(frame)?;
        self.transport.send(TransportMessage::text(text)).await?;
        Ok(())
    }

    /// Ensure the connection, then register and send.
    pub(crate) async fn invoke(
        self: &Arc<Self>,
        tool: &str,
        parameters: Value,
        deadline: Option<Duration>,
    ) -> ClientResult<Value> {
        let parameters = object_parameters(parameters)?;
        self.ensure_connected().await?;
        self.request(tool, parameters, deadline, true).await
    }

    /// Register and send on the current connection.
    pub(crate) async fn request(
        &self,
        tool: &str,
        parameters: Map<String, Value>,
        deadline: Option<Duration>,
        track: bool,
    ) -> ClientResult<Value> {
        let (request_id, response) = self
            .pending
            .register_unary(tool, parameters.clone(), track);
        let _guard = PendingGuard::new(&self.pending, &request_id);

        let frame = self.frame_for(&request_id, tool, parameters, false);
        self.send_frame(&frame).await?;
        trace!(request_id = %request_id, tool, "request sent");

        await_completion(response, &request_id, deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop_callback() -> TokenCallback {
        Arc::new(|_: &str| {})
    }

    #[test]
    fn identifiers_are_unique_and_never_reserved() {
        let table = PendingTable::default();
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let (id, _rx) = table.register_unary("echo", Map::new(), true);
            assert!(id.starts_with("req-"));
            assert_ne!(id, toolrelay_wire::HEARTBEAT_REQUEST_ID);
            assert!(seen.insert(id));
        }
        assert_eq!(table.len(), 200);
    }

    #[tokio::test]
    async fn out_of_order_results_reach_their_callers() {
        let table = PendingTable::default();
        let (a, rx_a) = table.register_unary("slow", Map::new(), true);
        let (b, rx_b) = table.register_unary("fast", Map::new(), true);

        assert!(matches!(
            table.route(InboundFrame::result(&b, json!("B"))),
            Routed::Completed { usage: Some(_), .. }
        ));
        assert!(matches!(
            table.route(InboundFrame::result(&a, json!("A"))),
            Routed::Completed { .. }
        ));

        assert_eq!(rx_a.await.unwrap(), Ok(json!("A")));
        assert_eq!(rx_b.await.unwrap(), Ok(json!("B")));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn error_frame_fails_exactly_one_entry() {
        let table = PendingTable::default();
        let (a, rx_a) = table.register_unary("search", Map::new(), true);
        let (b, _rx_b) = table.register_unary("search", Map::new(), true);

        assert!(matches!(
            table.route(InboundFrame::error(&a, "index offline")),
            Routed::Failed { .. }
        ));
        assert_eq!(
            rx_a.await.unwrap(),
            Err(ClientError::Tool {
                tool: "search".into(),
                message: "index offline".into()
            })
        );
        assert!(table.contains(&b));
        assert!(matches!(
            table.route(InboundFrame::result(&a, json!(1))),
            Routed::Orphan
        ));
    }

    #[test]
    fn unknown_identifier_is_an_orphan() {
        let table = PendingTable::default();
        let (id, _rx) = table.register_unary("echo", Map::new(), true);
        assert!(matches!(
            table.route(InboundFrame::result("req-999-nope", json!(1))),
            Routed::Orphan
        ));
        assert!(table.contains(&id));
    }

    #[test]
    fn stream_frames_on_unary_entry_are_rejected() {
        let table = PendingTable::default();
        let (id, _rx) = table.register_unary("echo", Map::new(), true);
        assert!(matches!(
            table.route(InboundFrame::token(&id, "x")),
            Routed::Mismatch { expected: PendingKind::Unary }
        ));
        assert!(matches!(
            table.route(InboundFrame::end(&id)),
            Routed::Mismatch { .. }
        ));
        assert!(table.contains(&id));
    }

    #[tokio::test]
    async fn stream_counts_tokens_until_end() {
        let table = PendingTable::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let callback: TokenCallback = Arc::new(move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (id, rx) = table.register_stream("summarize", Map::new(), callback);

        for chunk in ["a", "b"] {
            match table.route(InboundFrame::token(&id, chunk)) {
                Routed::Token { on_token, content } => on_token(&content),
                _ => panic!("expected token"),
            }
        }
        assert!(matches!(
            table.route(InboundFrame::result(&id, json!(1))),
            Routed::Mismatch { expected: PendingKind::Stream }
        ));
        assert!(matches!(
            table.route(InboundFrame::end(&id)),
            Routed::Completed { .. }
        ));

        let summary = rx.await.unwrap().unwrap();
        assert_eq!(summary.tokens, 2);
        assert_eq!(summary.request_id, id);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn untracked_entries_report_no_usage() {
        let table = PendingTable::default();
        let (id, _rx) = table.register_unary("register_client", Map::new(), false);
        assert!(matches!(
            table.route(InboundFrame::result(&id, json!({"ok": true}))),
            Routed::Completed { usage: None, .. }
        ));
    }

    #[tokio::test]
    async fn fail_untracked_keeps_caller_requests() {
        let table = PendingTable::default();
        let (internal, rx_internal) = table.register_unary("list_tools", Map::new(), false);
        let (caller, _rx_caller) = table.register_stream("summarize", Map::new(), noop_callback());

        assert_eq!(table.fail_untracked(&ClientError::Disconnected), 1);
        assert!(!table.contains(&internal));
        assert!(table.contains(&caller));
        assert_eq!(rx_internal.await.unwrap(), Err(ClientError::Disconnected));
    }

    #[tokio::test]
    async fn fail_all_drains_the_table() {
        let table = PendingTable::default();
        let (_, rx) = table.register_unary("echo", Map::new(), true);
        table.register_stream("summarize", Map::new(), noop_callback());
        assert_eq!(table.fail_all(&ClientError::Disconnected), 2);
        assert_eq!(table.len(), 0);
        assert_eq!(rx.await.unwrap(), Err(ClientError::Disconnected));
    }

    #[test]
    fn guard_removes_abandoned_entry() {
        let table = PendingTable::default();
        let (id, _rx) = table.register_unary("echo", Map::new(), true);
        {
            let _guard = PendingGuard::new(&table, &id);
        }
        assert!(!table.contains(&id));
    }

    #[test]
    fn parameters_must_be_objects() {
        assert_eq!(object_parameters(Value::Null).unwrap(), Map::new());
        assert_eq!(
            object_parameters(json!({"q": 1})).unwrap().get("q"),
            Some(&json!(1))
        );
        assert!(matches!(
            object_parameters(json!([1, 2])),
            Err(ClientError::InvalidParameters(_))
        ));
        assert!(matches!(
            object_parameters(json!("text")),
            Err(ClientError::InvalidParameters(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let (_tx, rx) = oneshot::channel::<ClientResult<Value>>();
        let result = await_completion(rx, "req-1-x", Some(Duration::from_millis(50))).await;
        assert_eq!(
            result,
            Err(ClientError::Timeout {
                request_id: "req-1-x".into(),
                timeout: Duration::from_millis(50)
            })
        );
    }

    #[tokio::test]
    async fn dropped_sender_means_disconnected() {
        let (tx, rx) = oneshot::channel::<ClientResult<Value>>();
        drop(tx);
        assert_eq!(
            await_completion(rx, "req-1-x", None).await,
            Err(ClientError::Disconnected)
        );
    }
}
