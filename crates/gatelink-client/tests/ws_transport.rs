//! End-to-end over a real WebSocket loopback server.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gatelink_client::testutil::PingHandler;
use gatelink_client::{GatewayError, GatewaySession, SessionConfig};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

type Ws = WebSocketStream<TcpStream>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn next_json(ws: &mut Ws) -> Value {
    loop {
        match ws.next().await.expect("peer open").expect("ws frame") {
            Message::Text(text) => return serde_json::from_str(&text).expect("json"),
            Message::Close(_) => panic!("peer closed early"),
            _ => {}
        }
    }
}

async fn send_json(ws: &mut Ws, value: &Value) {
    ws.send(Message::text(value.to_string())).await.expect("send");
}

#[tokio::test]
async fn full_round_trip_over_loopback() -> anyhow::Result<()> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let gateway = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("upgrade");

        send_json(
            &mut ws,
            &json!({
                "type": "event", "event": "connect.challenge", "payload": {"nonce": "n1"}
            }),
        )
        .await;

        let connect = next_json(&mut ws).await;
        assert_eq!(connect["type"], "req");
        assert_eq!(connect["method"], "connect");
        assert_eq!(connect["params"]["auth"]["token"], "tok_ws");
        assert_eq!(connect["params"]["auth"]["nonce"], "n1");
        assert_eq!(connect["params"]["role"], "bridge");
        send_json(
            &mut ws,
            &json!({
                "type": "res", "id": connect["id"].clone(), "ok": true,
                "payload": {"type": "hello-ok", "protocol": 1}
            }),
        )
        .await;

        // One client request.
        let request = next_json(&mut ws).await;
        assert_eq!(request["method"], "editor.status");
        send_json(
            &mut ws,
            &json!({
                "type": "res", "id": request["id"].clone(), "ok": true,
                "payload": {"status": "ok"}
            }),
        )
        .await;

        // One server-initiated invocation.
        send_json(
            &mut ws,
            &json!({
                "type": "req", "id": "srv_1", "method": "vscode.invoke",
                "params": {"action": "ping", "params": {}}
            }),
        )
        .await;
        let reply = next_json(&mut ws).await;
        assert_eq!(reply["id"], "srv_1");
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["payload"]["pong"], true);
    });

    let config = SessionConfig {
        url: format!("ws://{addr}"),
        token: "tok_ws".into(),
        auto_reconnect: false,
        connect_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    };
    let session = GatewaySession::new(config, Arc::new(PingHandler));

    let hello = session.connect().await?;
    assert_eq!(hello["type"], "hello-ok");

    let status = session.request("editor.status", json!({})).await?;
    assert_eq!(status["status"], "ok");

    gateway.await?;
    session.disconnect();
    Ok(())
}

#[tokio::test]
async fn refused_dial_surfaces_transport_error() {
    init_tracing();
    // Bind then drop to find a port nothing is listening on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = SessionConfig {
        url: format!("ws://127.0.0.1:{port}"),
        connect_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    };
    let session = GatewaySession::new(config, Arc::new(PingHandler));

    let err = session.connect().await.unwrap_err();
    assert!(
        matches!(
            err,
            GatewayError::Transport(_) | GatewayError::ConnectTimeout(_)
        ),
        "unexpected error: {err}"
    );
}
