//! Shared test utilities for the session test suites.
//!
//! Provides the in-memory [`MockConnector`]/[`ServerEnd`] pair, fake
//! invocation handlers, a recording observer, and a short-timeout
//! [`test_config`] — previously copy-pasted across test modules.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gatelink_protocol::{CHALLENGE_EVENT, Frame, decode, encode};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::dispatch::{InvocationError, InvocationHandler, SessionObserver};
use crate::session::{GatewaySession, SessionState};
use crate::transport::{Connector, Socket, TransportError};

/// A [`SessionConfig`] with short deadlines and reconnection off, suitable
/// as a baseline for tests that override individual fields.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        url: "ws://mock.gateway".into(),
        token: "tok_test".into(),
        auto_reconnect: false,
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        reconnect_delay: Duration::from_millis(50),
        ..SessionConfig::default()
    }
}

/// In-memory connector. Each accepted `connect` hands the test a
/// [`ServerEnd`] for driving the gateway side of the conversation.
pub struct MockConnector {
    accepts: mpsc::UnboundedSender<ServerEnd>,
    failures: Mutex<VecDeque<String>>,
    connects: AtomicUsize,
}

impl MockConnector {
    /// Create a connector and the stream of server ends it will accept.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                accepts: tx,
                failures: Mutex::new(VecDeque::new()),
                connects: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    /// Queue a failure: the next `connect` call errors instead of accepting.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.failures.lock().push_back(message.into());
    }

    /// Total `connect` calls observed, including failed ones.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, TransportError> {
        let _ = self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failures.lock().pop_front() {
            return Err(TransportError::Connect {
                url: url.to_string(),
                message,
            });
        }
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
        self.accepts
            .send(ServerEnd {
                to_client: Some(to_client_tx),
                from_client: from_client_rx,
            })
            .map_err(|_| TransportError::Connect {
                url: url.to_string(),
                message: "mock listener dropped".into(),
            })?;
        Ok(Box::new(MockSocket {
            incoming: to_client_rx,
            outgoing: from_client_tx,
        }))
    }
}

/// The client side of one mock connection, driving the [`Socket`] seam from
/// the channels shared with its [`ServerEnd`].
struct MockSocket {
    incoming: mpsc::UnboundedReceiver<Result<String, TransportError>>,
    outgoing: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Socket for MockSocket {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(text)
            .map_err(|_| TransportError::Send("mock peer dropped".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) {
        self.incoming.close();
    }
}

/// The gateway side of one mock connection.
pub struct ServerEnd {
    to_client: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// Deliver a frame to the client.
    pub fn send(&self, frame: &Frame) {
        if let (Some(tx), Ok(text)) = (self.to_client.as_ref(), encode(frame)) {
            let _ = tx.send(Ok(text));
        }
    }

    /// Deliver raw text to the client, bypassing the codec.
    pub fn send_text(&self, text: &str) {
        if let Some(tx) = self.to_client.as_ref() {
            let _ = tx.send(Ok(text.to_string()));
        }
    }

    /// Surface a read error on the client side.
    pub fn fail_read(&mut self, message: &str) {
        if let Some(tx) = self.to_client.take() {
            let _ = tx.send(Err(TransportError::Recv(message.to_string())));
        }
    }

    /// Close the connection from the server side.
    pub fn close(&mut self) {
        self.to_client = None;
    }

    /// Next frame the client sent, decoded.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        let text = self.from_client.recv().await?;
        decode(&text).ok()
    }

    /// Frame already queued by the client, if any.
    pub fn try_next_frame(&mut self) -> Option<Frame> {
        let text = self.from_client.try_recv().ok()?;
        decode(&text).ok()
    }

    /// Drive the full handshake: emit the challenge, consume the `connect`
    /// request, answer it with `hello`. Returns the connect request frame
    /// so tests can assert on its params.
    pub async fn complete_handshake(&mut self, nonce: &str, hello: Value) -> Frame {
        self.send(&Frame::Event {
            event: CHALLENGE_EVENT.into(),
            payload: json!({ "nonce": nonce }),
        });
        let frame = self.next_frame().await.expect("connect request");
        let Frame::Request { ref id, .. } = frame else {
            panic!("expected connect request, got: {frame:?}");
        };
        self.send(&Frame::ok_response(id.clone(), hello));
        frame
    }
}

/// Connect a session against its mock gateway and drive the handshake to
/// `Ready`. Returns the server end for the established connection.
pub async fn connect_ready(
    session: &GatewaySession,
    accepts: &mut mpsc::UnboundedReceiver<ServerEnd>,
) -> ServerEnd {
    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let mut server = accepts.recv().await.expect("mock accept");
    let _ = server
        .complete_handshake("nonce_1", json!({"type": "hello-ok"}))
        .await;
    let hello = connecting.await.expect("join").expect("connect");
    assert_eq!(hello["type"], "hello-ok");
    server
}

/// Handler answering `ping` with `{"pong": true}` and `explode` with a
/// failure; everything else is an unknown action.
pub struct PingHandler;

#[async_trait]
impl InvocationHandler for PingHandler {
    async fn invoke(&self, action: &str, _params: Value) -> Result<Value, InvocationError> {
        match action {
            "ping" => Ok(json!({"pong": true})),
            "explode" => Err(InvocationError::Failed {
                message: "boom".into(),
            }),
            other => Err(InvocationError::UnknownAction {
                action: other.into(),
            }),
        }
    }
}

/// Observer recording everything it sees, for assertions.
#[derive(Default)]
pub struct RecordingObserver {
    /// State transitions in arrival order.
    pub states: Mutex<Vec<SessionState>>,
    /// Unsolicited events as `(name, payload)`.
    pub events: Mutex<Vec<(String, Value)>>,
    /// Frames the session had no use for.
    pub unrecognized: Mutex<Vec<Frame>>,
}

impl SessionObserver for RecordingObserver {
    fn on_event(&self, event: &str, payload: &Value) {
        self.events.lock().push((event.to_string(), payload.clone()));
    }

    fn on_state(&self, state: SessionState) {
        self.states.lock().push(state);
    }

    fn on_unrecognized(&self, frame: &Frame) {
        self.unrecognized.lock().push(frame.clone());
    }
}
