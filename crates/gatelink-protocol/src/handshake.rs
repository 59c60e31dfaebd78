//! Typed payloads for the connect handshake.
//!
//! After the socket opens, the server emits a `connect.challenge` event with
//! a nonce. The client answers with a `connect` request whose params are a
//! [`ConnectParams`]; a successful response carries a [`HelloPayload`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lowest protocol revision this client speaks.
pub const PROTOCOL_MIN: u32 = 1;

/// Highest protocol revision this client speaks.
pub const PROTOCOL_MAX: u32 = 1;

/// Params of the `connect` request sent in answer to the challenge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Lowest protocol revision acceptable to the client.
    pub min_protocol: u32,
    /// Highest protocol revision acceptable to the client.
    pub max_protocol: u32,
    /// Client identity block.
    pub client: ClientInfo,
    /// Requested role, e.g. `bridge`.
    pub role: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Capabilities this client offers.
    pub caps: Vec<String>,
    /// Authentication material.
    pub auth: AuthParams,
    /// BCP 47 locale tag.
    pub locale: String,
    /// User-agent string.
    pub user_agent: String,
}

/// Identity block inside [`ConnectParams`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Stable client instance id.
    pub id: String,
    /// Client version string.
    pub version: String,
    /// Host platform, e.g. `linux` or `darwin`.
    pub platform: String,
    /// Operating mode, e.g. `interactive`.
    pub mode: String,
}

/// Authentication material inside [`ConnectParams`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthParams {
    /// Bearer token from configuration. Never compiled in.
    pub token: String,
    /// Nonce echoed from the server's challenge event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Payload of a successful `connect` response.
///
/// The server may attach arbitrary metadata; only the fields the client
/// actually reads are typed, the rest is preserved in [`HelloPayload::extra`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    /// Payload discriminator, `hello-ok` on success.
    #[serde(rename = "type")]
    pub kind: String,
    /// Negotiated protocol revision, when the server reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<u32>,
    /// Remaining server metadata, kept opaque.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_params() -> ConnectParams {
        ConnectParams {
            min_protocol: PROTOCOL_MIN,
            max_protocol: PROTOCOL_MAX,
            client: ClientInfo {
                id: "cli_01".into(),
                version: "0.1.0".into(),
                platform: "linux".into(),
                mode: "interactive".into(),
            },
            role: "bridge".into(),
            scopes: vec!["chat".into(), "actions".into()],
            caps: vec!["invoke".into()],
            auth: AuthParams {
                token: "tok_secret".into(),
                nonce: Some("abc".into()),
            },
            locale: "en-US".into(),
            user_agent: "gatelink/0.1.0".into(),
        }
    }

    #[test]
    fn connect_params_serialize_camel_case() {
        let value = serde_json::to_value(sample_params()).unwrap();
        assert_eq!(value["minProtocol"], 1);
        assert_eq!(value["maxProtocol"], 1);
        assert_eq!(value["client"]["id"], "cli_01");
        assert_eq!(value["auth"]["token"], "tok_secret");
        assert_eq!(value["auth"]["nonce"], "abc");
        assert_eq!(value["userAgent"], "gatelink/0.1.0");
    }

    #[test]
    fn auth_nonce_omitted_when_absent() {
        let mut params = sample_params();
        params.auth.nonce = None;
        let value = serde_json::to_value(params).unwrap();
        assert!(value["auth"].get("nonce").is_none());
    }

    #[test]
    fn hello_payload_preserves_unknown_fields() {
        let hello: HelloPayload = serde_json::from_value(json!({
            "type": "hello-ok",
            "protocol": 1,
            "serverName": "gateway",
            "features": ["chat"],
        }))
        .unwrap();
        assert_eq!(hello.kind, "hello-ok");
        assert_eq!(hello.protocol, Some(1));
        assert_eq!(hello.extra["serverName"], "gateway");
        assert_eq!(hello.extra["features"], json!(["chat"]));
    }

    #[test]
    fn hello_payload_round_trips() {
        let hello: HelloPayload = serde_json::from_value(json!({
            "type": "hello-ok",
            "sessionCount": 2,
        }))
        .unwrap();
        let back = serde_json::to_value(&hello).unwrap();
        assert_eq!(back["type"], "hello-ok");
        assert_eq!(back["sessionCount"], 2);
        assert!(back.get("protocol").is_none());
    }
}
