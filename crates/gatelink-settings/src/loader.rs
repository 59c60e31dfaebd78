//! Settings loading: defaults, user file, environment overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::GatelinkSettings;

/// Environment variable that relocates the settings file (tests, packaging).
const PATH_ENV: &str = "GATELINK_SETTINGS_PATH";

/// Path of the user settings file, `~/.gatelink/settings.json`.
///
/// `GATELINK_SETTINGS_PATH` overrides the default location.
pub fn settings_path() -> PathBuf {
    if let Ok(path) = std::env::var(PATH_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".gatelink").join("settings.json")
}

/// Deep-merge `overlay` into `base`.
///
/// Objects merge recursively; any other value in `overlay` replaces the
/// corresponding value in `base` wholesale.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Load settings from the default path with env overrides applied.
pub fn load_settings() -> Result<GatelinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific file path.
///
/// A missing file is not an error — defaults plus env overrides are returned.
/// A present-but-invalid file is an error; silently ignoring a corrupt config
/// would connect with the wrong credentials.
pub fn load_settings_from_path(path: &Path) -> Result<GatelinkSettings> {
    let defaults =
        serde_json::to_value(GatelinkSettings::default()).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;

    let merged = match std::fs::read_to_string(path) {
        Ok(text) => {
            let file_value: Value =
                serde_json::from_str(&text).map_err(|e| SettingsError::Parse {
                    path: path.display().to_string(),
                    source: e,
                })?;
            deep_merge(defaults, file_value)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            defaults
        }
        Err(e) => {
            return Err(SettingsError::Io {
                path: path.display().to_string(),
                source: e,
            });
        }
    };

    let mut settings: GatelinkSettings =
        serde_json::from_value(merged).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Apply `GATELINK_*` environment overrides in place.
fn apply_env_overrides(settings: &mut GatelinkSettings) {
    if let Ok(url) = std::env::var("GATELINK_GATEWAY_URL") {
        settings.gateway.url = url;
    }
    if let Ok(token) = std::env::var("GATELINK_GATEWAY_TOKEN") {
        settings.gateway.token = token;
    }
    if let Ok(flag) = std::env::var("GATELINK_AUTO_RECONNECT") {
        match flag.as_str() {
            "1" | "true" => settings.gateway.auto_reconnect = true,
            "0" | "false" => settings.gateway.auto_reconnect = false,
            other => {
                tracing::warn!(value = %other, "ignoring unparseable GATELINK_AUTO_RECONNECT");
            }
        }
    }
}
