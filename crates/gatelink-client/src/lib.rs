//! # gatelink-client
//!
//! One long-lived authenticated session to the gateway over a persistent
//! WebSocket. The session multiplexes concurrent request/response pairs by
//! correlation id, answers server-initiated invocations through an injected
//! handler, and supervises reconnection after unexpected closure.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `session` | State machine: connect → challenge → authenticate → ready |
//! | `pending` | Correlation-id table with at-most-once resolution |
//! | `dispatch` | Server-invocation handler seam and reply framing |
//! | `reconnect` | Single-timer reconnect supervisor |
//! | `transport` | Socket abstraction plus the tokio-tungstenite connector |
//! | `config` | Session configuration assembled from `gatelink-settings` |
//! | `errors` | `GatewayError` taxonomy |
//! | `testutil` | In-memory connector and fakes shared by the test suites |
//!
//! ## Data flow
//!
//! Callers issue requests through [`GatewaySession::request`]; one event-loop
//! task per socket serializes all sends and receives. Inbound frames resolve
//! pending entries, feed the invocation dispatcher, or reach the observer.
//!
//! There is no global session: construct a [`GatewaySession`], inject an
//! [`InvocationHandler`] and optionally a [`SessionObserver`], and share the
//! handle (it is cheaply cloneable).

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod pending;
pub mod reconnect;
pub mod session;
pub mod testutil;
pub mod transport;

pub use config::SessionConfig;
pub use dispatch::{InvocationError, InvocationHandler, NoopObserver, SessionObserver};
pub use errors::GatewayError;
pub use session::{GatewaySession, SessionState};
pub use transport::{Connector, Socket, TransportError, WsConnector};
