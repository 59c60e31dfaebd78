//! Settings schema.

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Root settings object, mirroring `~/.gatelink/settings.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatelinkSettings {
    /// Gateway connection settings.
    pub gateway: GatewaySettings,
    /// Identity the client presents during the handshake.
    pub client: ClientSettings,
}

impl GatelinkSettings {
    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let parsed =
            url::Url::parse(&self.gateway.url).map_err(|e| SettingsError::InvalidUrl {
                url: self.gateway.url.clone(),
                reason: e.to_string(),
            })?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(SettingsError::InvalidUrl {
                url: self.gateway.url.clone(),
                reason: format!("unsupported scheme {other:?}, expected ws or wss"),
            }),
        }
    }
}

/// Connection parameters for the gateway socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// WebSocket endpoint of the gateway.
    pub url: String,
    /// Bearer token presented during the handshake. Empty by default;
    /// deployments must configure a real value.
    pub token: String,
    /// Whether to schedule a reconnect attempt after an unexpected close.
    pub auto_reconnect: bool,
    /// Handshake deadline in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-request deadline in milliseconds.
    pub request_timeout_ms: u64,
    /// Flat delay before a reconnect attempt, in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:18789".into(),
            token: String::new(),
            auto_reconnect: true,
            connect_timeout_ms: 15_000,
            request_timeout_ms: 30_000,
            reconnect_delay_ms: 5_000,
        }
    }
}

/// Identity block sent in the `connect` request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Requested role.
    pub role: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Capabilities offered to the gateway.
    pub caps: Vec<String>,
    /// Operating mode reported in the identity block.
    pub mode: String,
    /// BCP 47 locale tag.
    pub locale: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            role: "bridge".into(),
            scopes: vec!["chat".into(), "actions".into()],
            caps: vec!["invoke".into()],
            mode: "interactive".into(),
            locale: "en-US".into(),
        }
    }
}
