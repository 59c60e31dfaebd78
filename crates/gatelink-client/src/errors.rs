//! Error taxonomy for the gateway session.

use std::time::Duration;

use crate::transport::TransportError;

/// Failure surfaced to a caller of the session API.
///
/// Transport and decode faults are contained inside the session; callers only
/// ever see them as the failure of the specific `connect` or `request` they
/// were awaiting.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A request was attempted before (or after) the session was
    /// authenticated. Nothing was sent.
    #[error("not authenticated to gateway")]
    Unauthenticated,

    /// The gateway rejected the handshake.
    #[error("gateway rejected handshake: {0}")]
    Auth(String),

    /// No response arrived before the per-request deadline.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The handshake did not complete within the connect window.
    #[error("no successful handshake within {0:?}")]
    ConnectTimeout(Duration),

    /// The caller cancelled the request before it resolved.
    #[error("request cancelled")]
    Cancelled,

    /// The connection closed while the operation was outstanding.
    #[error("gateway connection closed")]
    Closed,

    /// A socket-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The gateway answered the request with `ok: false`.
    #[error("gateway error: {0}")]
    Remote(String),
}
