//! Library half of the `vigild` binary: the agent loop and result reporting.

pub mod agent;
pub mod reporter;

pub use agent::Agent;
pub use reporter::{LogReporter, Reporter, pass_to_json};
