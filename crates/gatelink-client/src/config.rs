//! Session configuration.

use std::time::Duration;

use gatelink_settings::GatelinkSettings;

/// Everything a [`crate::GatewaySession`] needs to know, resolved to concrete
/// values. Build one from settings with [`SessionConfig::from_settings`], or
/// start from `Default` and override fields in tests.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// WebSocket endpoint of the gateway.
    pub url: String,
    /// Bearer token presented during the handshake.
    pub token: String,
    /// Whether to schedule a reconnect attempt after an unexpected close.
    pub auto_reconnect: bool,
    /// Handshake deadline.
    pub connect_timeout: Duration,
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// Flat delay before a reconnect attempt.
    pub reconnect_delay: Duration,
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

impl SessionConfig {
    /// Resolve a config from loaded settings.
    pub fn from_settings(settings: &GatelinkSettings) -> Self {
        Self {
            url: settings.gateway.url.clone(),
            token: settings.gateway.token.clone(),
            auto_reconnect: settings.gateway.auto_reconnect,
            connect_timeout: Duration::from_millis(settings.gateway.connect_timeout_ms),
            request_timeout: Duration::from_millis(settings.gateway.request_timeout_ms),
            reconnect_delay: Duration::from_millis(settings.gateway.reconnect_delay_ms),
            role: settings.client.role.clone(),
            scopes: settings.client.scopes.clone(),
            caps: settings.client.caps.clone(),
            mode: settings.client.mode.clone(),
            locale: settings.client.locale.clone(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&GatelinkSettings::default())
    }
}
