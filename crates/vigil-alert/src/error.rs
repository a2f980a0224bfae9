//! Alert dispatch error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for alert plugin operations.
pub type AlertResult<T> = Result<T, AlertError>;

/// Errors from invoking a single alert plugin.
///
/// These never escape [`AlertDispatcher::send_alert`](crate::AlertDispatcher::send_alert);
/// they are collected into the escalation report or logged.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("failed to start {}: {source}", executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write message to plugin stdin: {0}")]
    Stdin(#[source] io::Error),

    #[error("failed to wait for plugin: {0}")]
    Wait(#[source] io::Error),

    #[error("failed to list alert plugins in {}: {source}", dir.display())]
    ListPlugins {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Other(String),
}
