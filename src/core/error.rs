use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced at the provider boundary.
///
/// The `Display` text is also what `FrameProvider::last_error` reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("failed to open source {source_id}: {reason}")]
    Open { source_id: String, reason: String },

    #[error("no video stream found in {0}")]
    NoVideoStream(String),

    #[error("decoder unavailable: {0}")]
    Decoder(String),

    #[error("provider has not been initialized")]
    NotInitialized,

    #[error("provider is already running")]
    AlreadyRunning,

    #[error("frame interval must be at least 1, got {0}")]
    InvalidFrameInterval(u32),

    #[error("queue capacity must be at least 1")]
    InvalidCapacity,
}

/// Failures while loading or validating a session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("unrecognized source `{0}`")]
    UnknownSource(String),

    #[error("`{0}` needs the `opencv` feature")]
    FeatureDisabled(String),
}
