//! Server-invocation dispatch and the observer seam.
//!
//! The gateway may initiate request-shaped frames of its own (editor-action
//! invocations). Each one is handed to the injected [`InvocationHandler`];
//! its result or failure becomes exactly one `res` frame echoing the original
//! correlation id. A handler fault never propagates past the dispatcher — it
//! is converted into the response's error field.

use async_trait::async_trait;
use gatelink_protocol::{Frame, INVOKE_METHOD};
use serde_json::Value;

use crate::session::SessionState;

/// Handler failure, surfaced to the gateway as the response error message.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    /// The requested action is not implemented by this handler.
    #[error("unknown action: {action}")]
    UnknownAction {
        /// The action that was requested.
        action: String,
    },

    /// The action ran and failed.
    #[error("{message}")]
    Failed {
        /// Failure description.
        message: String,
    },
}

/// Executes server-initiated invocations. In the full system this is the
/// editor-action executor; tests use fakes from [`crate::testutil`].
#[async_trait]
pub trait InvocationHandler: Send + Sync {
    /// Execute `action` with `params` and return the result payload.
    async fn invoke(&self, action: &str, params: Value) -> Result<Value, InvocationError>;
}

/// Receives everything the session does not route to a specific caller.
///
/// Callbacks run on the session's dispatch path and must not block; hand
/// anything expensive to a channel or task of your own.
pub trait SessionObserver: Send + Sync {
    /// An unsolicited gateway event (never the connect challenge).
    fn on_event(&self, event: &str, payload: &Value) {
        let _ = (event, payload);
    }

    /// The session changed state.
    fn on_state(&self, state: SessionState) {
        let _ = state;
    }

    /// A well-formed frame the session had no use for, e.g. a response whose
    /// correlation id matches nothing outstanding.
    fn on_unrecognized(&self, frame: &Frame) {
        let _ = frame;
    }
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Run one server invocation to completion and frame its reply.
pub(crate) async fn respond_to_invocation(
    handler: &dyn InvocationHandler,
    id: &str,
    method: &str,
    params: &Value,
) -> Frame {
    if method != INVOKE_METHOD {
        return Frame::err_response(id, format!("unsupported method: {method}"));
    }
    let Some(action) = params.get("action").and_then(Value::as_str) else {
        return Frame::err_response(id, "invocation missing 'action'");
    };
    let inner_params = params
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    match handler.invoke(action, inner_params).await {
        Ok(payload) => Frame::ok_response(id, payload),
        Err(e) => {
            tracing::debug!(id, action, error = %e, "invocation handler failed");
            Frame::err_response(id, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct PingHandler;

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

    #[tokio::test]
    async fn successful_invocation_becomes_ok_response() {
        let reply = respond_to_invocation(
            &PingHandler,
            "x",
            INVOKE_METHOD,
            &json!({"action": "ping", "params": {}}),
        )
        .await;
        assert_eq!(reply, Frame::ok_response("x", json!({"pong": true})));
    }

    #[tokio::test]
    async fn handler_failure_becomes_error_response() {
        let reply = respond_to_invocation(
            &PingHandler,
            "x",
            INVOKE_METHOD,
            &json!({"action": "explode"}),
        )
        .await;
        assert_eq!(reply, Frame::err_response("x", "boom"));
    }

    #[tokio::test]
    async fn unknown_action_becomes_error_response() {
        let reply = respond_to_invocation(
            &PingHandler,
            "x",
            INVOKE_METHOD,
            &json!({"action": "teleport"}),
        )
        .await;
        assert_eq!(reply, Frame::err_response("x", "unknown action: teleport"));
    }

    #[tokio::test]
    async fn missing_action_becomes_error_response() {
        let reply =
            respond_to_invocation(&PingHandler, "x", INVOKE_METHOD, &json!({"params": {}})).await;
        assert_eq!(reply, Frame::err_response("x", "invocation missing 'action'"));
    }

    #[tokio::test]
    async fn unsupported_method_becomes_error_response() {
        let reply = respond_to_invocation(&PingHandler, "x", "gateway.exec", &json!({})).await;
        assert_eq!(
            reply,
            Frame::err_response("x", "unsupported method: gateway.exec")
        );
    }

    #[tokio::test]
    async fn missing_inner_params_default_to_empty_object() {
        struct CaptureParams;

        #[async_trait]
        impl InvocationHandler for CaptureParams {
            async fn invoke(&self, _action: &str, params: Value) -> Result<Value, InvocationError> {
                Ok(params)
            }
        }

        let reply = respond_to_invocation(
            &CaptureParams,
            "x",
            INVOKE_METHOD,
            &json!({"action": "echo"}),
        )
        .await;
        assert_eq!(reply, Frame::ok_response("x", json!({})));
    }
}
