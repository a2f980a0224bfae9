//! Shared types used across Vigil crates.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Health state derived from a check command's exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "UNK")]
    Unknown,
}

impl CheckState {
    /// Map a process exit code through the fixed plugin table.
    ///
    /// Returns `None` for codes outside `0..=3`; the caller decides how to
    /// report those.
    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CheckState::Ok),
            1 => Some(CheckState::Warn),
            2 => Some(CheckState::Fail),
            3 => Some(CheckState::Unknown),
            _ => None,
        }
    }

    /// FAIL and UNKNOWN count against a service; OK and WARN do not.
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckState::Fail | CheckState::Unknown)
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckState::Ok => "OK",
            CheckState::Warn => "WARN",
            CheckState::Fail => "FAIL",
            CheckState::Unknown => "UNK",
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one check execution, handed to the reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub state: CheckState,
    pub info: String,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, state: CheckState, info: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state,
            info: info.into(),
        }
    }
}

/// A configured notification plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTarget {
    /// Label used in logs and escalation reports.
    pub plugin_name: String,
    /// Executable, resolved against the alert plugin directory when relative.
    pub executable: PathBuf,
    pub args: Vec<String>,
}

impl AlertTarget {
    pub fn new(
        plugin_name: impl Into<String>,
        executable: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            executable: executable.into(),
            args,
        }
    }
}
