//! Consecutive-failure tracking for a single service.
//!
//! A single FAIL is usually noise. The tracker only signals an alert once a
//! service has failed `threshold` checks in a row, and signals recovery on
//! the first good result after that. The tracker does not log; the caller
//! knows which service it belongs to.

use vigil_core::CheckState;

/// What the caller should do after recording a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed worth telling anyone about.
    None,
    /// The service just crossed the failure threshold.
    Alert,
    /// The service is healthy again after an alert.
    Recovered,
}

/// Tracks consecutive check results for one service.
#[derive(Debug)]
pub struct FailureTracker {
    /// Consecutive FAIL/UNK count.
    consecutive_failures: u32,
    /// Failures needed before alerting.
    threshold: u32,
    /// Whether an alert is outstanding.
    alerting: bool,
    last_state: Option<CheckState>,
}

impl FailureTracker {
    /// Create a tracker. A zero threshold is treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: 0,
            threshold: threshold.max(1),
            alerting: false,
            last_state: None,
        }
    }

    /// Record a check result and return the resulting transition.
    pub fn record(&mut self, state: CheckState) -> Transition {
        self.last_state = Some(state);

        if state.is_failure() {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= self.threshold && !self.alerting {
                self.alerting = true;
                return Transition::Alert;
            }
            return Transition::None;
        }

        self.consecutive_failures = 0;
        if self.alerting {
            self.alerting = false;
            return Transition::Recovered;
        }
        Transition::None
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether an alert has been sent and not yet cleared by a recovery.
    pub fn is_alerting(&self) -> bool {
        self.alerting
    }

    pub fn last_state(&self) -> Option<CheckState> {
        self.last_state
    }
}
