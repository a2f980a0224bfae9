//! Where check results go after a pass.

use tracing::info;

use vigil_scheduler::CheckPass;

/// Receives every non-empty check pass.
pub trait Reporter {
    fn report(&mut self, pass: &CheckPass);
}

/// Emits one structured log line per result.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, pass: &CheckPass) {
        for result in &pass.results {
            info!(
                service = %result.name,
                state = %result.state,
                period_secs = pass.period.as_secs_f64(),
                info = %result.info.trim_end(),
                "service state"
            );
        }
    }
}

/// JSON document for a single pass, as printed by `vigild check`.
pub fn pass_to_json(pass: &CheckPass) -> serde_json::Value {
    serde_json::json!({
        "period": pass.period.as_secs_f64(),
        "services": pass.results,
    })
}
