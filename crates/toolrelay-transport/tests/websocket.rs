use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use toolrelay_transport::{
    Transport, TransportError, TransportMessage, TransportState, TransportType, WebSocketConfig,
    WebSocketTransport,
};

/// Echoes text frames; the text `close` makes it close with 1001.
async fn spawn_echo_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                if text.as_str() == "close" {
                    let _ = ws
                        .close(Some(CloseFrame {
                            code: CloseCode::Away,
                            reason: "bye".into(),
                        }))
                        .await;
                    break;
                }
                ws.send(Message::Ping(vec![1, 2, 3].into())).await.unwrap();
                ws.send(Message::Text(text)).await.unwrap();
            }
        }
    });

    format!("ws://{addr}")
}

#[tokio::test]
async fn test_transport_type() {
    let transport = WebSocketTransport::connect_to("ws://localhost:1");
    assert_eq!(transport.transport_type(), TransportType::WebSocket);
}

#[tokio::test]
async fn test_echo_round_trip_skips_pings() {
    let url = spawn_echo_host().await;
    let transport = WebSocketTransport::connect_to(url);
    transport.connect().await.unwrap();
    assert_eq!(transport.state().await, TransportState::Connected);

    transport
        .send(TransportMessage::text(r#"{"request_id":"r1","result":1}"#))
        .await
        .unwrap();
    let reply = transport.receive().await.unwrap();
    assert_eq!(reply.as_text().unwrap(), r#"{"request_id":"r1","result":1}"#);

    transport.disconnect().await.unwrap();
    assert_eq!(transport.state().await, TransportState::Disconnected);
}

#[tokio::test]
async fn test_peer_close_reports_code() {
    let url = spawn_echo_host().await;
    let transport = WebSocketTransport::connect_to(url);
    transport.connect().await.unwrap();

    transport.send(TransportMessage::text("close")).await.unwrap();
    match transport.receive().await {
        Err(TransportError::ConnectionClosed { code, reason }) => {
            assert_eq!(code, Some(1001));
            assert_eq!(reason, "bye");
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(transport.state().await, TransportState::Disconnected);
}

#[tokio::test]
async fn test_oversized_inbound_is_dropped() {
    let url = spawn_echo_host().await;
    let transport = WebSocketTransport::new(WebSocketConfig::new(url).with_max_message_size(8));
    transport.connect().await.unwrap();

    transport.send(TransportMessage::text("0123456")).await.unwrap();
    assert_eq!(transport.receive().await.unwrap().as_text().unwrap(), "0123456");

    assert!(matches!(
        transport.send(TransportMessage::text("012345678")).await,
        Err(TransportError::MessageTooLarge { size: 9, max: 8 })
    ));
}
