//! Frame model for the gateway wire protocol.
//!
//! Every message on the socket is one [`Frame`], discriminated by its `type`
//! field. Three kinds exist on the wire:
//!
//! - `req` — a method call carrying a correlation id. Sent by the client for
//!   outbound requests, and by the server for server-initiated invocations.
//! - `res` — the answer to a `req`, echoing its correlation id.
//! - `event` — a fire-and-forget notification with no correlation id. The
//!   connect challenge is a distinguished event (`connect.challenge`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name of the authentication challenge the server emits after the
/// socket opens.
pub const CHALLENGE_EVENT: &str = "connect.challenge";

/// Method name of the handshake request sent in answer to the challenge.
pub const CONNECT_METHOD: &str = "connect";

/// Method name the server uses for editor-action invocations. The params
/// carry the inner `action` name and its own `params` object.
pub const INVOKE_METHOD: &str = "vscode.invoke";

/// One message on the gateway socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// A method call with a correlation id.
    #[serde(rename = "req")]
    Request {
        /// Correlation id, unique among outstanding requests on the socket.
        id: String,
        /// Method name.
        method: String,
        /// Method parameters.
        #[serde(default)]
        params: Value,
    },

    /// The answer to a request, carrying the same correlation id.
    #[serde(rename = "res")]
    Response {
        /// Correlation id of the request being answered.
        id: String,
        /// Whether the request succeeded.
        ok: bool,
        /// Success payload. Present when `ok` is true.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        /// Error description. Present when `ok` is false.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
    },

    /// A server notification with no correlation id.
    #[serde(rename = "event")]
    Event {
        /// Event name, e.g. `connect.challenge` or `agent.status`.
        event: String,
        /// Event payload.
        #[serde(default)]
        payload: Value,
    },
}

/// Error description carried in a failed [`Frame::Response`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable failure message.
    pub message: String,
}

impl Frame {
    /// Build a request frame.
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self::Request {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Build a successful response frame.
    pub fn ok_response(id: impl Into<String>, payload: Value) -> Self {
        Self::Response {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a failed response frame.
    pub fn err_response(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Response {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(ErrorBody {
                message: message.into(),
            }),
        }
    }

    /// Extract the nonce if this frame is the connect challenge.
    ///
    /// Returns `None` for any other frame, or for a challenge whose payload
    /// lacks a string `nonce` field.
    pub fn challenge_nonce(&self) -> Option<&str> {
        match self {
            Self::Event { event, payload } if event == CHALLENGE_EVENT => {
                payload.get("nonce").and_then(Value::as_str)
            }
            _ => None,
        }
    }
}
