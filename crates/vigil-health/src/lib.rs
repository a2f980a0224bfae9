//! vigil-health: check execution and failure tracking for Vigil.
//!
//! Runs a service's check plugin as an external process and turns its
//! exit status into a [`CheckState`](vigil_core::CheckState). Tracks
//! consecutive failures per service so the agent alerts on persistent
//! problems rather than single blips.
//!
//! # Architecture
//!
//! ```text
//! CheckExecutor
//!   ├── spawn plugin (cwd = service dir, stdin = null)
//!   ├── wait (optionally bounded by a timeout)
//!   ├── exit code → OK / WARN / FAIL / UNK
//!   └── CheckOutcome { result, lag }
//!
//! FailureTracker
//!   └── consecutive FAIL/UNK → Alert, first good result after → Recovered
//! ```
//!
//! # Plugin Contract
//!
//! A check plugin takes no input, writes diagnostics to stdout/stderr,
//! and exits with `0` (OK), `1` (WARN), `2` (FAIL) or `3` (UNKNOWN).
//! Anything else is reported as UNKNOWN and logged as an error.

pub mod checker;
pub mod tracker;

pub use checker::{CheckCommand, CheckExecutor, CheckOutcome};
pub use tracker::{FailureTracker, Transition};
