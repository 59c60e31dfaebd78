//! Error types for settings loading.

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Failure while loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON or does not match the schema.
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The configured gateway URL is not a usable ws/wss URL.
    #[error("invalid gateway url {url:?}: {reason}")]
    InvalidUrl {
        /// The offending value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}
