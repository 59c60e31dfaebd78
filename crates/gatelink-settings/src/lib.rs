//! # gatelink-settings
//!
//! Configuration management with layered sources for the gateway client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`GatelinkSettings::default()`]
//! 2. **User file** — `~/.gatelink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `GATELINK_*` overrides (highest priority)
//!
//! There is no global singleton: callers load a [`GatelinkSettings`] value
//! and hand the relevant pieces to the session they construct. The bearer
//! token is a configuration value with an empty compiled default — it is
//! never embedded in the binary.
//!
//! # Usage
//!
//! ```no_run
//! use gatelink_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("gateway url: {}", settings.gateway.url);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
