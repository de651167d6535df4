//! Request correlation, tracking and deadlines against a scripted host.

mod common;

use std::time::Duration;

use common::{client_with_host, eventually, record, test_config};
use pretty_assertions::assert_eq;
use serde_json::json;
use toolrelay_client::{ClientError, ClientEvent, EventKind, TransportError};

#[tokio::test]
async fn test_invoke_connects_and_sends_identity() {
    let (client, mut host) = client_with_host(test_config());

    let call = client.invoke("echo", json!({"message": "hi"}));
    let script = async {
        let request = host.next_request().await;
        assert_eq!(request["tool"], "echo");
        assert_eq!(request["parameters"], json!({"message": "hi"}));
        assert_eq!(request["stream"], false);
        assert_eq!(request["agent"], "tester");
        assert_eq!(request["emotion"], "calm");
        host.reply(&request, json!("hi"));
    };
    let (result, ()) = tokio::join!(call, script);

    assert_eq!(result.unwrap(), json!("hi"));
    assert!(client.is_connected());
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_out_of_order_replies_reach_their_callers() {
    let (client, mut host) = client_with_host(test_config());
    client.connect().await.unwrap();

    let first = client.invoke("search", json!({"q": "first"}));
    let second = client.invoke("search", json!({"q": "second"}));
    let script = async {
        let a = host.next_request().await;
        let b = host.next_request().await;
        assert_ne!(a["request_id"], b["request_id"]);
        // Answer in reverse order of arrival.
        host.reply(&b, json!({"echo": b["parameters"]["q"]}));
        host.reply(&a, json!({"echo": a["parameters"]["q"]}));
    };
    let (first, second, ()) = tokio::join!(first, second, script);

    assert_eq!(first.unwrap(), json!({"echo": "first"}));
    assert_eq!(second.unwrap(), json!({"echo": "second"}));
}

#[tokio::test]
async fn test_tool_error_fails_only_its_caller() {
    let (client, mut host) = client_with_host(test_config());
    client.connect().await.unwrap();

    let failing = client.invoke("search", json!({}));
    let healthy = client.invoke("echo", json!({}));
    let script = async {
        let a = host.next_request().await;
        let b = host.next_request().await;
        let (search, echo) = if a["tool"] == "search" { (a, b) } else { (b, a) };
        host.fail(&search, "index offline");
        host.reply(&echo, json!("ok"));
    };
    let (failing, healthy, ()) = tokio::join!(failing, healthy, script);

    assert_eq!(
        failing.unwrap_err(),
        ClientError::Tool {
            tool: "search".into(),
            message: "index offline".into()
        }
    );
    assert_eq!(healthy.unwrap(), json!("ok"));
}

#[tokio::test]
async fn test_orphan_frames_change_nothing() {
    let (client, mut host) = client_with_host(test_config());
    client.connect().await.unwrap();
    let messages = record(&client, EventKind::Message);

    host.peer
        .send_json(&json!({"request_id": "req-404-unknown", "result": 1}));
    host.peer
        .send_json(&json!({"request_id": "req-405-unknown", "error": "late"}));

    let call = client.invoke("echo", json!({}));
    let script = async {
        let request = host.next_request().await;
        host.reply(&request, json!("still fine"));
    };
    let (result, ()) = tokio::join!(call, script);

    assert_eq!(result.unwrap(), json!("still fine"));
    assert_eq!(client.tracker().total(), 1);
    assert_eq!(client.tracker().count("echo"), 1);
    assert_eq!(messages.lock().len(), 3);
}

#[tokio::test]
async fn test_heartbeat_reply_never_completes_caller_requests() {
    let (client, mut host) = client_with_host(test_config());
    client.connect().await.unwrap();
    let messages = record(&client, EventKind::Message);
    let latency = record(&client, EventKind::Latency);

    let call = client.invoke("echo", json!({"message": "ping"}));
    let script = async {
        let request = host.next_request().await;
        host.peer
            .send_json(&json!({"request_id": "__heartbeat__", "result": "ping"}));
        host.peer
            .send_json(&json!({"request_id": "__heartbeat__", "type": "bogus"}));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(client.pending_requests(), 1);
        host.reply(&request, json!("caller"));
    };
    let (result, ()) = tokio::join!(call, script);

    assert_eq!(result.unwrap(), json!("caller"));
    // No probe was outstanding, so neither reply produced a sample.
    assert!(latency.lock().is_empty());
    assert_eq!(messages.lock().len(), 1);
}

#[tokio::test]
async fn test_stream_frames_for_unary_request_are_discarded() {
    let (client, mut host) = client_with_host(test_config());
    client.connect().await.unwrap();

    let call = client.invoke("echo", json!({}));
    let script = async {
        let request = host.next_request().await;
        host.token(&request, "stray");
        host.end(&request);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(client.pending_requests(), 1);
        host.reply(&request, json!("done"));
    };
    let (result, ()) = tokio::join!(call, script);
    assert_eq!(result.unwrap(), json!("done"));
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let (client, mut host) = client_with_host(test_config());
    client.connect().await.unwrap();

    host.peer.send_text("not json");
    host.peer.send_json(&json!({"result": "no id"}));
    host.peer.send_json(&json!({"request_id": "req-1-x", "type": "mystery"}));

    let call = client.invoke("echo", json!({}));
    let script = async {
        let request = host.next_request().await;
        host.reply(&request, json!(true));
    };
    let (result, ()) = tokio::join!(call, script);
    assert_eq!(result.unwrap(), json!(true));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_null_parameters_become_empty_object() {
    let (client, mut host) = client_with_host(test_config());

    let call = client.invoke("echo", serde_json::Value::Null);
    let script = async {
        let request = host.next_request().await;
        assert_eq!(request["parameters"], json!({}));
        host.reply(&request, json!(null));
    };
    let (result, ()) = tokio::join!(call, script);
    assert_eq!(result.unwrap(), json!(null));
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected_before_io() {
    let (client, host) = client_with_host(test_config());
    let error = client.invoke("echo", json!("text")).await.unwrap_err();
    assert!(matches!(error, ClientError::InvalidParameters(_)));
    assert_eq!(host.peer.connect_count(), 0);
}

#[tokio::test]
async fn test_deadline_removes_pending_entry() {
    let (client, mut host) = client_with_host(test_config());
    client.connect().await.unwrap();

    let error = client
        .invoke_with_timeout("slow", json!({}), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        ClientError::Timeout { timeout, .. } if timeout == Duration::from_millis(50)
    ));
    assert_eq!(client.pending_requests(), 0);

    // A late reply is an orphan and is not counted.
    let request = host.next_request().await;
    host.reply(&request, json!("too late"));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(client.tracker().total(), 0);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_configured_request_timeout_applies_to_invoke() {
    let config = test_config().with_request_timeout(Duration::from_millis(40));
    let (client, _host) = client_with_host(config);

    let error = client.invoke("slow", json!({})).await.unwrap_err();
    assert!(matches!(error, ClientError::Timeout { .. }));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_send_failure_removes_entry() {
    let (client, host) = client_with_host(test_config());
    client.connect().await.unwrap();
    host.peer.fail_sends(true);

    let error = client.invoke("echo", json!({})).await.unwrap_err();
    assert!(matches!(
        error,
        ClientError::Transport(TransportError::SendFailed(_))
    ));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_tracker_records_only_successes() {
    let (client, mut host) = client_with_host(test_config());
    client.connect().await.unwrap();
    let invoked = record(&client, EventKind::ToolInvoked);

    let ok = client.invoke("search", json!({"q": "rust"}));
    let script = async {
        let request = host.next_request().await;
        host.reply(&request, json!([]));
    };
    let (ok, ()) = tokio::join!(ok, script);
    ok.unwrap();

    let failed = client.invoke("search", json!({"q": "boom"}));
    let script = async {
        let request = host.next_request().await;
        host.fail(&request, "nope");
    };
    let (failed, ()) = tokio::join!(failed, script);
    assert!(failed.is_err());

    assert_eq!(client.tracker().count("search"), 1);
    // Handshake requests are not caller invocations.
    assert_eq!(client.tracker().count("register_client"), 0);
    assert_eq!(client.tracker().count("list_tools"), 0);

    let status = client.status();
    let last = status.last_tool_used.unwrap();
    assert_eq!(last.tool, "search");
    assert_eq!(last.parameters.get("q"), Some(&json!("rust")));

    eventually(|| invoked.lock().len() == 1).await;
    assert!(matches!(
        &invoked.lock()[0],
        ClientEvent::ToolInvoked(invocation) if invocation.tool == "search"
    ));
}

#[tokio::test]
async fn test_manual_disconnect_fails_pending_requests() {
    let (client, mut host) = client_with_host(test_config());
    client.connect().await.unwrap();

    let waiting = client.clone();
    let call = tokio::spawn(async move { waiting.invoke("slow", json!({})).await });
    host.next_request().await;

    assert!(client.disconnect().await);
    let result = call.await.unwrap();
    assert_eq!(result.unwrap_err(), ClientError::Disconnected);
    assert_eq!(client.pending_requests(), 0);
}
