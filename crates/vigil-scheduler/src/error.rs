//! Scheduler error types.

use thiserror::Error;

use vigil_core::ConfigError;

/// Errors raised while building services or the monitor.
///
/// Check failures are never errors; they come back as `UNK` results.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("service name must not be empty")]
    EmptyName,

    #[error("service `{name}`: period must be positive and finite, got {period}s")]
    InvalidPeriod { name: String, period: f64 },

    #[error("service `{0}`: command must not be empty")]
    EmptyCommand(String),

    #[error("service `{name}`: {source}")]
    InvalidCommand {
        name: String,
        #[source]
        source: ConfigError,
    },

    #[error("no services to monitor")]
    NoServices,

    #[error("duplicate service name: {0}")]
    DuplicateService(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
