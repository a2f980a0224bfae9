//! vigil-alert: alert delivery for Vigil.
//!
//! Alerts are delivered by notification plugins: executables in the alert
//! plugin directory that read the alert text on stdin and do whatever they
//! do with it (mail, chat, pager). Vigil never interprets their output or
//! exit code.
//!
//! # Architecture
//!
//! ```text
//! AlertDispatcher::send_alert(message)
//!   ├── primary pass: one task per target → PluginLauncher::launch
//!   │     └── invocation failures → [PluginFailure]
//!   └── escalation pass (only if failures): report → every target
//!         └── failures logged, never escalated again
//! ```

pub mod dispatcher;
pub mod error;
pub mod launcher;
pub mod plugins;

pub use dispatcher::{AlertDispatcher, AlertReport, PluginFailure, escalation_message};
pub use error::{AlertError, AlertResult};
pub use launcher::{PluginLauncher, ProcessLauncher};
pub use plugins::list_alert_plugins;
