//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating `vigil.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid command: {0}")]
    Command(String),

    #[error("invalid duration: {0:?}")]
    Duration(String),

    #[error("invalid service `{name}`: {reason}")]
    Service { name: String, reason: String },

    #[error("duplicate service name: {0}")]
    DuplicateService(String),

    #[error("invalid alert target `{name}`: {reason}")]
    AlertTarget { name: String, reason: String },

    #[error("failure_threshold must be at least 1")]
    FailureThreshold,
}
