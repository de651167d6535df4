//! Scripted tool host for integration tests.
//!
//! The host answers registration, tool listing and heartbeats on its own and
//! forwards every other request to the test, which replies through `peer`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use toolrelay_client::{
    ChannelPeer, ChannelTransport, Client, ClientConfig, ClientEvent, EventKind, FrameCodec,
    InboundFrame, ReconnectConfig, channel_pair,
};

pub const WAIT: Duration = Duration::from_secs(2);

pub struct ScriptedHost {
    pub peer: ChannelPeer,
    pub registrations: Arc<Mutex<Vec<Value>>>,
    requests: mpsc::UnboundedReceiver<Value>,
    task: JoinHandle<()>,
}

impl ScriptedHost {
    pub fn spawn(peer: ChannelPeer) -> Self {
        let (forward, requests) = mpsc::unbounded_channel();
        let registrations = Arc::new(Mutex::new(Vec::new()));

        let host_peer = peer.clone();
        let seen = Arc::clone(&registrations);
        let task = tokio::spawn(async move {
            while let Some(frame) = host_peer.recv_json().await {
                let request_id = frame["request_id"].clone();
                match frame["tool"].as_str() {
                    Some("register_client") => {
                        seen.lock().push(frame.clone());
                        host_peer.send_json(
                            &json!({"request_id": request_id, "result": {"status": "registered"}}),
                        );
                    }
                    Some("list_tools") => {
                        host_peer.send_json(&json!({
                            "request_id": request_id,
                            "result": {"tools": [
                                {"name": "echo", "description": "Echo a message"},
                                {"name": "search"},
                                "summarize"
                            ]}
                        }));
                    }
                    _ if request_id == json!("__heartbeat__") => {
                        host_peer.send_json(&json!({"request_id": request_id, "result": "ping"}));
                    }
                    _ => {
                        let _ = forward.send(frame);
                    }
                }
            }
        });

        Self {
            peer,
            registrations,
            requests,
            task,
        }
    }

    /// Next forwarded request, failing the test after [`WAIT`].
    pub async fn next_request(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.requests.recv())
            .await
            .expect("host waited too long for a request")
            .expect("host stopped")
    }

    /// Whether a request arrives within `within`.
    pub async fn request_within(&mut self, within: Duration) -> Option<Value> {
        tokio::time::timeout(within, self.requests.recv()).await.ok().flatten()
    }

    pub fn reply(&self, request: &Value, result: Value) {
        self.send(&InboundFrame::result(request_id(request), result));
    }

    pub fn fail(&self, request: &Value, message: &str) {
        self.send(&InboundFrame::error(request_id(request), message));
    }

    pub fn token(&self, request: &Value, content: &str) {
        self.send(&InboundFrame::token(request_id(request), content));
    }

    pub fn end(&self, request: &Value) {
        self.send(&InboundFrame::end(request_id(request)));
    }

    fn send(&self, frame: &InboundFrame) {
        let text = FrameCodec::new()
            .encode_inbound(frame)
            .expect("inbound frame encodes");
        self.peer.send_text(text);
    }
}

fn request_id(request: &Value) -> &str {
    request["request_id"].as_str().expect("request carries an id")
}

impl Drop for ScriptedHost {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Route client logs through the test harness; `RUST_LOG` selects the level.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fast reconnects, no heartbeat.
pub fn test_config() -> ClientConfig {
    ClientConfig::new("channel://peer")
        .with_identity("tester", "calm")
        .without_heartbeat()
        .with_reconnect(ReconnectConfig::default().with_delay(Duration::from_millis(20)))
}

pub fn client_with_host(config: ClientConfig) -> (Client<ChannelTransport>, ScriptedHost) {
    init_logging();
    let (transport, peer) = channel_pair();
    (Client::new(config, transport), ScriptedHost::spawn(peer))
}

/// Collect every event of `kind`.
pub fn record(client: &Client<ChannelTransport>, kind: EventKind) -> Arc<Mutex<Vec<ClientEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    client.on(kind, move |event| sink.lock().push(event.clone()));
    events
}

/// Poll `condition` until it holds, failing the test after [`WAIT`].
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
