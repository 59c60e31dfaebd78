//! The gateway session state machine.
//!
//! One [`GatewaySession`] owns at most one socket at a time. The lifecycle:
//!
//! ```text
//! idle --connect()--> connecting --socket open--> awaiting-challenge
//!      --challenge event--> authenticating --ok response--> ready
//! any state --socket close--> closed (--auto-reconnect--> connecting ...)
//! ```
//!
//! All socket I/O for one connection is serialized on a single event-loop
//! task (`run_socket`): it drains the outbound queue and classifies inbound
//! frames. Responses resolve pending entries by correlation id regardless of
//! arrival order; server invocations are answered through the injected
//! handler; everything else reaches the observer. Timers (connect window,
//! per-request deadline, reconnect backoff) race freely against frame
//! arrival — the pending table's removal discipline guarantees each waiter
//! completes exactly once.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use gatelink_protocol::handshake::{AuthParams, ClientInfo, ConnectParams, PROTOCOL_MAX, PROTOCOL_MIN};
use gatelink_protocol::{CHALLENGE_EVENT, CONNECT_METHOD, Frame};
use metrics::counter;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::dispatch::{self, InvocationHandler, NoopObserver, SessionObserver};
use crate::errors::GatewayError;
use crate::pending::PendingTable;
use crate::reconnect::ReconnectSupervisor;
use crate::transport::{Connector, Socket, WsConnector};

/// Connection state of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Never connected.
    Idle,
    /// Opening the socket.
    Connecting,
    /// Socket open, waiting for the server's challenge event.
    AwaitingChallenge,
    /// Challenge answered, waiting for the handshake response.
    Authenticating,
    /// Authenticated and serving requests.
    Ready,
    /// Connection torn down. `connect()` may be called again.
    Closed,
}

/// Handshake bookkeeping alive between socket open and authentication.
struct HandshakeState {
    /// Completes the in-flight `connect()` call.
    ready_tx: oneshot::Sender<Result<Value, GatewayError>>,
    /// Correlation id of the `connect` request once the challenge arrived.
    connect_id: Option<String>,
}

struct Inner {
    config: SessionConfig,
    connector: Box<dyn Connector>,
    handler: Arc<dyn InvocationHandler>,
    observer: Arc<dyn SessionObserver>,
    /// Stable per-process client instance id, sent in the identity block.
    client_id: String,
    state: Mutex<SessionState>,
    /// Wakes `connect()` waiters on transitions to `Ready` or `Closed`.
    ready_notify: Notify,
    authenticated: AtomicBool,
    /// Server metadata from the last successful handshake.
    hello: Mutex<Option<Value>>,
    /// Monotonic correlation-id counter. Never reset, so ids are unique for
    /// the session lifetime, which subsumes the per-socket requirement.
    next_id: AtomicU64,
    pending: PendingTable,
    /// Writer handle of the live socket's event loop, if any.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    handshake: Mutex<Option<HandshakeState>>,
    /// Socket generation. Bumped whenever the current socket is retired so a
    /// stale event loop cannot tear down its successor's state.
    epoch: AtomicU64,
    /// Set by `disconnect()`; suppresses automatic reconnection until the
    /// next caller-initiated `connect()`.
    user_closed: AtomicBool,
    reconnect: ReconnectSupervisor,
}

/// Handle to the gateway session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct GatewaySession {
    inner: Arc<Inner>,
}

impl GatewaySession {
    /// Create a session using the production WebSocket connector and no
    /// observer.
    pub fn new(config: SessionConfig, handler: Arc<dyn InvocationHandler>) -> Self {
        Self::with_connector(config, Box::new(WsConnector), handler, Arc::new(NoopObserver))
    }

    /// Create a session with every collaborator injected.
    pub fn with_connector(
        config: SessionConfig,
        connector: Box<dyn Connector>,
        handler: Arc<dyn InvocationHandler>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                handler,
                observer,
                client_id: format!("cli_{}", Uuid::now_v7().simple()),
                state: Mutex::new(SessionState::Idle),
                ready_notify: Notify::new(),
                authenticated: AtomicBool::new(false),
                hello: Mutex::new(None),
                next_id: AtomicU64::new(1),
                pending: PendingTable::new(),
                outbound: Mutex::new(None),
                handshake: Mutex::new(None),
                epoch: AtomicU64::new(0),
                user_closed: AtomicBool::new(false),
                reconnect: ReconnectSupervisor::new(),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Whether the handshake has completed on the live socket.
    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::SeqCst)
    }

    /// Server metadata from the last successful handshake.
    pub fn server_info(&self) -> Option<Value> {
        self.inner.hello.lock().clone()
    }

    /// Whether a reconnect timer is pending.
    pub fn reconnect_scheduled(&self) -> bool {
        self.inner.reconnect.is_scheduled()
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Connect and authenticate, returning the server's hello payload.
    ///
    /// Idempotent: while a handshake is in flight the call awaits it, and
    /// while ready it returns the recorded hello immediately. Re-enables
    /// automatic reconnection after a previous `disconnect()`.
    pub async fn connect(&self) -> Result<Value, GatewayError> {
        self.inner.user_closed.store(false, Ordering::SeqCst);
        Self::connect_inner(Arc::clone(&self.inner)).await
    }

    /// Tear down the connection and cancel any pending reconnect timer.
    ///
    /// Outstanding requests fail with [`GatewayError::Closed`]. Automatic
    /// reconnection stays disabled until `connect()` is called again.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        if *inner.state.lock() == SessionState::Idle {
            return;
        }
        tracing::info!("disconnecting gateway session");
        inner.user_closed.store(true, Ordering::SeqCst);
        inner.reconnect.cancel();
        let _ = inner.epoch.fetch_add(1, Ordering::SeqCst);
        let _ = inner.outbound.lock().take();
        inner.authenticated.store(false, Ordering::SeqCst);
        if let Some(handshake) = inner.handshake.lock().take() {
            let _ = handshake.ready_tx.send(Err(GatewayError::Closed));
        }
        inner.pending.fail_all(|| GatewayError::Closed);
        Self::set_state(inner, SessionState::Closed);
    }

    /// Issue a request and await its response payload.
    ///
    /// Fails immediately with [`GatewayError::Unauthenticated`] when the
    /// handshake has not completed — nothing is sent in that case. Otherwise
    /// the caller suspends until the matching response arrives, the deadline
    /// elapses, or the connection tears down, whichever happens first.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        self.request_with_token(method, params, &CancellationToken::new())
            .await
    }

    /// [`request`](Self::request) with early cancellation: when `cancel`
    /// fires first the waiter fails with [`GatewayError::Cancelled`] and the
    /// table entry is removed without waiting for the network.
    pub async fn request_with_token(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, GatewayError> {
        let inner = &self.inner;
        if !inner.authenticated.load(Ordering::SeqCst) {
            return Err(GatewayError::Unauthenticated);
        }

        let id = Self::next_correlation_id(inner);
        let frame = Frame::request(id.clone(), method, params);
        let mut rx = inner.pending.register(&id);
        if !Self::send_frame(inner, &frame) {
            let _ = inner.pending.expire(&id);
            return Err(GatewayError::Closed);
        }

        let deadline = inner.config.request_timeout;
        tokio::select! {
            outcome = tokio::time::timeout(deadline, &mut rx) => match outcome {
                Ok(Ok(result)) => result,
                // Sender dropped without completing; only teardown does that,
                // and teardown sends an explicit failure first.
                Ok(Err(_)) => Err(GatewayError::Closed),
                Err(_elapsed) => {
                    if inner.pending.expire(&id) {
                        counter!("gatelink_request_timeouts_total").increment(1);
                        tracing::warn!(id = %id, method, "gateway request timed out");
                        Err(GatewayError::RequestTimeout(deadline))
                    } else {
                        // A response won the race against the deadline.
                        rx.try_recv().map_or(Err(GatewayError::Closed), |outcome| outcome)
                    }
                }
            },
            () = cancel.cancelled() => {
                if inner.pending.expire(&id) {
                    Err(GatewayError::Cancelled)
                } else {
                    rx.try_recv().map_or(Err(GatewayError::Closed), |outcome| outcome)
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connection establishment
    // ─────────────────────────────────────────────────────────────────────

    /// Idempotent connect shared by `connect()` and the reconnect timer.
    async fn connect_inner(inner: Arc<Inner>) -> Result<Value, GatewayError> {
        loop {
            let mut notified = pin!(inner.ready_notify.notified());
            notified.as_mut().enable();

            let start = {
                let mut state = inner.state.lock();
                match *state {
                    SessionState::Ready => {
                        return Ok(inner.hello.lock().clone().unwrap_or(Value::Null));
                    }
                    SessionState::Connecting
                    | SessionState::AwaitingChallenge
                    | SessionState::Authenticating => false,
                    SessionState::Idle | SessionState::Closed => {
                        *state = SessionState::Connecting;
                        true
                    }
                }
            };

            if start {
                inner.observer.on_state(SessionState::Connecting);
                return Self::establish(&inner).await;
            }
            // Another caller owns the handshake; wait for it to settle and
            // re-check (a failed attempt leaves `Closed`, making this caller
            // the next initiator).
            notified.await;
        }
    }

    /// Run one connection attempt under the connect window.
    async fn establish(inner: &Arc<Inner>) -> Result<Value, GatewayError> {
        let window = inner.config.connect_timeout;
        match tokio::time::timeout(window, Self::open_and_authenticate(inner)).await {
            Ok(Ok(hello)) => Ok(hello),
            Ok(Err(e)) => {
                Self::abandon_connect(inner);
                Err(e)
            }
            Err(_elapsed) => {
                tracing::warn!(window = ?window, "gateway handshake timed out");
                Self::abandon_connect(inner);
                Err(GatewayError::ConnectTimeout(window))
            }
        }
    }

    /// Open the socket, start its event loop, and await the handshake.
    async fn open_and_authenticate(inner: &Arc<Inner>) -> Result<Value, GatewayError> {
        let socket = inner.connector.connect(&inner.config.url).await?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        *inner.outbound.lock() = Some(out_tx);
        let (ready_tx, ready_rx) = oneshot::channel();
        *inner.handshake.lock() = Some(HandshakeState {
            ready_tx,
            connect_id: None,
        });
        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = tokio::spawn(Self::run_socket(Arc::clone(inner), socket, out_rx, epoch));

        Self::set_state(inner, SessionState::AwaitingChallenge);

        match ready_rx.await {
            Ok(Ok(hello)) => {
                inner.authenticated.store(true, Ordering::SeqCst);
                *inner.hello.lock() = Some(hello.clone());
                Self::set_state(inner, SessionState::Ready);
                tracing::info!("gateway session ready");
                Ok(hello)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(GatewayError::Closed),
        }
    }

    /// Retire a half-open connection after a failed or timed-out handshake.
    fn abandon_connect(inner: &Arc<Inner>) {
        let _ = inner.epoch.fetch_add(1, Ordering::SeqCst);
        let _ = inner.outbound.lock().take();
        let _ = inner.handshake.lock().take();
        inner.authenticated.store(false, Ordering::SeqCst);
        inner.pending.fail_all(|| GatewayError::Closed);
        Self::set_state(inner, SessionState::Closed);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Socket event loop
    // ─────────────────────────────────────────────────────────────────────

    /// Serialize all I/O for one socket: drain the outbound queue and
    /// dispatch inbound frames until either side goes away.
    async fn run_socket(
        inner: Arc<Inner>,
        mut socket: Box<dyn Socket>,
        mut out_rx: mpsc::UnboundedReceiver<String>,
        epoch: u64,
    ) {
        loop {
            tokio::select! {
                outbound = out_rx.recv() => match outbound {
                    Some(text) => {
                        if let Err(e) = socket.send(text).await {
                            tracing::warn!(error = %e, "socket send failed");
                            break;
                        }
                    }
                    // Writer handle dropped: this socket is being retired.
                    None => {
                        socket.close().await;
                        break;
                    }
                },
                inbound = socket.recv() => match inbound {
                    Some(Ok(text)) => Self::handle_text(&inner, &text),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "socket read failed");
                        break;
                    }
                    None => {
                        tracing::debug!("gateway closed the connection");
                        break;
                    }
                },
            }
        }
        Self::on_socket_closed(&inner, epoch);
    }

    /// Decode and classify one inbound frame.
    fn handle_text(inner: &Arc<Inner>, text: &str) {
        let frame = match gatelink_protocol::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                counter!("gatelink_decode_failures_total").increment(1);
                tracing::warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        match frame {
            Frame::Event { ref event, .. } if event == CHALLENGE_EVENT => {
                Self::handle_challenge(inner, &frame);
            }
            Frame::Event { event, payload } => inner.observer.on_event(&event, &payload),
            Frame::Response {
                id,
                ok,
                payload,
                error,
            } => Self::handle_response(inner, id, ok, payload, error),
            Frame::Request { id, method, params } => {
                Self::handle_invocation(inner, id, method, params);
            }
        }
    }

    /// Answer the server's challenge with the `connect` request.
    fn handle_challenge(inner: &Arc<Inner>, frame: &Frame) {
        if !Self::transition_if(
            inner,
            SessionState::AwaitingChallenge,
            SessionState::Authenticating,
        ) {
            tracing::warn!("challenge received outside handshake, ignoring");
            return;
        }

        let nonce = frame.challenge_nonce().map(ToString::to_string);
        if nonce.is_none() {
            tracing::warn!("challenge event carried no nonce");
        }

        let id = Self::next_correlation_id(inner);
        {
            let mut handshake = inner.handshake.lock();
            let Some(state) = handshake.as_mut() else {
                tracing::warn!("challenge arrived with no handshake in flight");
                return;
            };
            state.connect_id = Some(id.clone());
        }

        let params = Self::connect_params(inner, nonce);
        let request = Frame::request(id, CONNECT_METHOD, params);
        if !Self::send_frame(inner, &request) {
            tracing::warn!("failed to queue connect request");
        }
    }

    /// Route a response to the handshake or the pending table.
    fn handle_response(
        inner: &Arc<Inner>,
        id: String,
        ok: bool,
        payload: Option<Value>,
        error: Option<gatelink_protocol::ErrorBody>,
    ) {
        let handshake_hit = {
            let mut handshake = inner.handshake.lock();
            if handshake
                .as_ref()
                .is_some_and(|s| s.connect_id.as_deref() == Some(id.as_str()))
            {
                handshake.take()
            } else {
                None
            }
        };
        if let Some(state) = handshake_hit {
            let outcome = if ok {
                Ok(payload.unwrap_or(Value::Null))
            } else {
                let message = error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "authentication rejected".into());
                Err(GatewayError::Auth(message))
            };
            let _ = state.ready_tx.send(outcome);
            return;
        }

        let outcome = if ok {
            Ok(payload.clone().unwrap_or(Value::Null))
        } else {
            let message = error
                .clone()
                .map(|e| e.message)
                .unwrap_or_else(|| "request failed".into());
            Err(GatewayError::Remote(message))
        };
        if !inner.pending.resolve(&id, outcome) {
            tracing::debug!(id = %id, "response with no matching request");
            inner.observer.on_unrecognized(&Frame::Response {
                id,
                ok,
                payload,
                error,
            });
        }
    }

    /// Run a server invocation off the event loop and queue its reply.
    fn handle_invocation(inner: &Arc<Inner>, id: String, method: String, params: Value) {
        let handler = Arc::clone(&inner.handler);
        let sender = inner.outbound.lock().clone();
        let _ = tokio::spawn(async move {
            let reply = dispatch::respond_to_invocation(handler.as_ref(), &id, &method, &params).await;
            match gatelink_protocol::encode(&reply) {
                Ok(text) => {
                    if let Some(tx) = sender {
                        if tx.send(text).is_err() {
                            tracing::debug!(id = %id, "connection gone before invocation reply");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode invocation reply"),
            }
        });
    }

    /// Teardown after the socket's event loop exits.
    fn on_socket_closed(inner: &Arc<Inner>, epoch: u64) {
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            // A newer socket owns the session; nothing to tear down.
            return;
        }
        inner.authenticated.store(false, Ordering::SeqCst);
        let _ = inner.outbound.lock().take();
        if let Some(handshake) = inner.handshake.lock().take() {
            let _ = handshake.ready_tx.send(Err(GatewayError::Closed));
        }
        inner.pending.fail_all(|| GatewayError::Closed);
        Self::set_state(inner, SessionState::Closed);

        if inner.config.auto_reconnect && !inner.user_closed.load(Ordering::SeqCst) {
            Self::schedule_reconnect(inner);
        }
    }

    /// Arm the single reconnect timer.
    fn schedule_reconnect(inner: &Arc<Inner>) {
        counter!("gatelink_reconnects_scheduled_total").increment(1);
        tracing::info!(delay = ?inner.config.reconnect_delay, "scheduling gateway reconnect");
        let weak = Arc::downgrade(inner);
        inner.reconnect.schedule(inner.config.reconnect_delay, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.user_closed.load(Ordering::SeqCst) {
                return;
            }
            match Self::connect_inner(Arc::clone(&inner)).await {
                Ok(_) => tracing::info!("gateway reconnected"),
                Err(e) => {
                    tracing::warn!(error = %e, "reconnect attempt failed");
                    // A failed attempt counts as another unexpected closure:
                    // arm the next single timer.
                    if inner.config.auto_reconnect && !inner.user_closed.load(Ordering::SeqCst) {
                        Self::schedule_reconnect(&inner);
                    }
                }
            }
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    fn next_correlation_id(inner: &Inner) -> String {
        inner.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Encode and queue a frame on the live socket. Returns false when there
    /// is no live socket or the frame failed to encode.
    fn send_frame(inner: &Inner, frame: &Frame) -> bool {
        let text = match gatelink_protocol::encode(frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode frame");
                return false;
            }
        };
        let sender = inner.outbound.lock().clone();
        match sender {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }

    /// Build the `connect` request params from configuration.
    fn connect_params(inner: &Inner, nonce: Option<String>) -> Value {
        let params = ConnectParams {
            min_protocol: PROTOCOL_MIN,
            max_protocol: PROTOCOL_MAX,
            client: ClientInfo {
                id: inner.client_id.clone(),
                version: env!("CARGO_PKG_VERSION").into(),
                platform: std::env::consts::OS.into(),
                mode: inner.config.mode.clone(),
            },
            role: inner.config.role.clone(),
            scopes: inner.config.scopes.clone(),
            caps: inner.config.caps.clone(),
            auth: AuthParams {
                token: inner.config.token.clone(),
                nonce,
            },
            locale: inner.config.locale.clone(),
            user_agent: format!(
                "gatelink/{} ({})",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS
            ),
        };
        serde_json::to_value(params).unwrap_or(Value::Null)
    }

    /// Unconditional state change, notifying the observer and any waiters.
    fn set_state(inner: &Arc<Inner>, new: SessionState) {
        {
            let mut state = inner.state.lock();
            if *state == new {
                return;
            }
            *state = new;
        }
        tracing::debug!(state = ?new, "session state");
        inner.observer.on_state(new);
        if matches!(new, SessionState::Ready | SessionState::Closed) {
            inner.ready_notify.notify_waiters();
        }
    }

    /// Atomic conditional state change. Returns false when the current state
    /// differed from `from`.
    fn transition_if(inner: &Arc<Inner>, from: SessionState, to: SessionState) -> bool {
        let changed = {
            let mut state = inner.state.lock();
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        };
        if changed {
            tracing::debug!(state = ?to, "session state");
            inner.observer.on_state(to);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockConnector, PingHandler, test_config};
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn fresh_session_is_idle_and_unauthenticated() {
        let (connector, _accepts) = MockConnector::new();
        let session = GatewaySession::with_connector(
            test_config(),
            Box::new(connector),
            Arc::new(PingHandler),
            Arc::new(NoopObserver),
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_authenticated());
        assert!(session.server_info().is_none());
        assert_eq!(session.pending_requests(), 0);
    }

    #[tokio::test]
    async fn request_before_connect_fails_without_dialing() {
        let (connector, _accepts) = MockConnector::new();
        let counted = Arc::clone(&connector);
        let session = GatewaySession::with_connector(
            test_config(),
            Box::new(connector),
            Arc::new(PingHandler),
            Arc::new(NoopObserver),
        );

        let err = session.request("agent.send", json!({})).await.unwrap_err();
        assert_matches!(err, GatewayError::Unauthenticated);
        assert_eq!(counted.connect_count(), 0);
        assert_eq!(session.pending_requests(), 0);
    }

    #[tokio::test]
    async fn disconnect_before_connect_is_a_noop() {
        let (connector, _accepts) = MockConnector::new();
        let session = GatewaySession::with_connector(
            test_config(),
            Box::new(connector),
            Arc::new(PingHandler),
            Arc::new(NoopObserver),
        );
        session.disconnect();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn connect_failure_surfaces_transport_error() {
        let (connector, _accepts) = MockConnector::new();
        connector.fail_next("connection refused");
        let session = GatewaySession::with_connector(
            test_config(),
            Box::new(connector),
            Arc::new(PingHandler),
            Arc::new(NoopObserver),
        );

        let err = session.connect().await.unwrap_err();
        assert_matches!(err, GatewayError::Transport(_));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn correlation_ids_are_monotonic() {
        let (connector, _accepts) = MockConnector::new();
        let session = GatewaySession::with_connector(
            test_config(),
            Box::new(connector),
            Arc::new(PingHandler),
            Arc::new(NoopObserver),
        );
        let a = GatewaySession::next_correlation_id(&session.inner);
        let b = GatewaySession::next_correlation_id(&session.inner);
        assert_ne!(a, b);
        assert!(a.parse::<u64>().unwrap() < b.parse::<u64>().unwrap());
    }
}
