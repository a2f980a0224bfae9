//! A monitored service and its lag model.
//!
//! Identity (name, working directory, command, period) is fixed at
//! construction. The two mutable fields, `lag` and `last_checked`, are only
//! written by the [`ServicesMonitor`](crate::ServicesMonitor).

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use vigil_core::config::ServiceConfig;
use vigil_core::split_command;
use vigil_health::CheckCommand;

use crate::error::{SchedulerError, SchedulerResult};

/// Share of the nominal period kept as the base interval.
const PERIOD_FACTOR: f64 = 0.8;
/// Every second of lag shortens the interval by this many seconds.
const LAG_PENALTY: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct Service {
    command: CheckCommand,
    period: Duration,
    /// Wall-clock duration of the most recent check.
    lag: Duration,
    /// `None` until the first scheduled check.
    last_checked: Option<Instant>,
}

impl Service {
    /// Define a service. `command` is split shell-style into argv words.
    pub fn new(
        name: impl Into<String>,
        period: Duration,
        working_dir: impl Into<PathBuf>,
        command: &str,
    ) -> SchedulerResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SchedulerError::EmptyName);
        }
        if period.is_zero() {
            return Err(SchedulerError::InvalidPeriod { name, period: 0.0 });
        }
        let argv = match split_command(command) {
            Ok(argv) if argv.is_empty() => return Err(SchedulerError::EmptyCommand(name)),
            Ok(argv) => argv,
            Err(source) => return Err(SchedulerError::InvalidCommand { name, source }),
        };

        Ok(Self {
            command: CheckCommand::new(name, working_dir, argv),
            period,
            lag: Duration::ZERO,
            last_checked: None,
        })
    }

    /// Build a service from its `[[service]]` config entry.
    pub fn from_config(config: &ServiceConfig) -> SchedulerResult<Self> {
        let period = Duration::try_from_secs_f64(config.period)
            .ok()
            .filter(|p| !p.is_zero())
            .ok_or_else(|| SchedulerError::InvalidPeriod {
                name: config.name.clone(),
                period: config.period,
            })?;
        Self::new(config.name.clone(), period, config.working_dir(), &config.command)
    }

    /// Start from a previously measured lag instead of zero.
    pub fn with_lag(mut self, lag: Duration) -> Self {
        self.lag = lag;
        self
    }

    /// Start as if last checked at `at`.
    pub fn with_last_checked(mut self, at: Instant) -> Self {
        self.last_checked = Some(at);
        self
    }

    pub fn name(&self) -> &str {
        &self.command.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn lag(&self) -> Duration {
        self.lag
    }

    pub fn last_checked(&self) -> Option<Instant> {
        self.last_checked
    }

    pub fn command(&self) -> &CheckCommand {
        &self.command
    }

    /// Real check interval: 80% of the period minus a 3x lag penalty, floored at zero.
    pub fn effective_period(&self) -> Duration {
        let secs = self.period.as_secs_f64() * PERIOD_FACTOR - self.lag.as_secs_f64() * LAG_PENALTY;
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Time left until this service is due. Zero when never checked or overdue.
    pub fn due_in(&self, now: Instant) -> Duration {
        match self.last_checked {
            None => Duration::ZERO,
            Some(last) => self
                .effective_period()
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }

    pub(crate) fn record_lag(&mut self, lag: Duration) {
        self.lag = lag;
    }

    /// Never moves `last_checked` backward.
    pub(crate) fn mark_checked(&mut self, now: Instant) {
        self.last_checked = Some(match self.last_checked {
            Some(previous) => previous.max(now),
            None => now,
        });
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
