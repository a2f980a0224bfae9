//! Services monitor: decides which services are due and runs them.
//!
//! The `ServicesMonitor` owns every [`Service`] and is the only writer of
//! their `lag` and `last_checked` fields. A driver loop alternates between
//! [`sleep_time`](ServicesMonitor::sleep_time) and
//! [`check_pass`](ServicesMonitor::check_pass).
//!
//! Checks of one pass run as separate tasks. Each task gets its own copy of
//! the command and hands back `(index, outcome)`; the monitor writes the
//! results into its services after the join, so no locking is involved.
//! Both calibration and `check_pass` take `&mut self`: one caller at a time.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, warn};

use vigil_core::CheckResult;
use vigil_health::{CheckExecutor, CheckOutcome};

use crate::error::{SchedulerError, SchedulerResult};
use crate::service::Service;

/// Result of one check pass.
#[derive(Debug, Clone, Default)]
pub struct CheckPass {
    /// Longest nominal period among the checked services, reported with the batch.
    pub period: Duration,
    /// One result per checked service, in completion order.
    pub results: Vec<CheckResult>,
}

impl CheckPass {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub struct ServicesMonitor {
    services: Vec<Service>,
    executor: CheckExecutor,
}

impl ServicesMonitor {
    /// Build a monitor with the default executor and calibrate every service's lag.
    pub async fn new(services: Vec<Service>) -> SchedulerResult<Self> {
        Self::with_executor(services, CheckExecutor::new()).await
    }

    /// Build a monitor and calibrate every service's lag.
    pub async fn with_executor(
        services: Vec<Service>,
        executor: CheckExecutor,
    ) -> SchedulerResult<Self> {
        let mut monitor = Self::uncalibrated(services, executor)?;
        monitor.calibrate().await;
        Ok(monitor)
    }

    /// Build a monitor keeping whatever lag the services already carry.
    pub fn uncalibrated(services: Vec<Service>, executor: CheckExecutor) -> SchedulerResult<Self> {
        if services.is_empty() {
            return Err(SchedulerError::NoServices);
        }
        let mut seen = HashSet::new();
        for service in &services {
            if !seen.insert(service.name()) {
                return Err(SchedulerError::DuplicateService(service.name().to_string()));
            }
        }
        Ok(Self { services, executor })
    }

    /// Run every check once, concurrently, to measure its lag.
    ///
    /// The health states are discarded; `last_checked` is left untouched so
    /// every service is still due on the first pass.
    pub async fn calibrate(&mut self) {
        let dispatch = self.executor.dispatch().clone();
        self.measure_lags().with_subscriber(dispatch).await;
    }

    async fn measure_lags(&mut self) {
        let all: Vec<usize> = (0..self.services.len()).collect();
        let outcomes = self.run_checks(&all).await;
        for (index, outcome) in outcomes {
            let service = &mut self.services[index];
            service.record_lag(outcome.lag);
            debug!(
                service = %service,
                lag_secs = outcome.lag.as_secs_f64(),
                "measured service lag"
            );
            if outcome.lag > service.period() / 2 {
                warn!(
                    service = %service,
                    lag_secs = outcome.lag.as_secs_f64(),
                    period_secs = service.period().as_secs_f64(),
                    "service execution lag is too high"
                );
            }
        }
    }

    /// How long the caller may sleep before any service becomes due.
    pub fn sleep_time(&self, now: Instant) -> Duration {
        self.services
            .iter()
            .map(|s| s.due_in(now))
            .min()
            .unwrap_or(Duration::ZERO)
    }

    /// Check every service that is due within the slack of the slowest check.
    ///
    /// All selected services get `now` as their new `last_checked`, and their
    /// freshly measured lag. Returns an empty pass if nothing is in the window.
    pub async fn check_pass(&mut self, now: Instant) -> CheckPass {
        let dispatch = self.executor.dispatch().clone();
        self.run_pass(now).with_subscriber(dispatch).await
    }

    async fn run_pass(&mut self, now: Instant) -> CheckPass {
        let selected = self.select_due(now);
        let Some(period) = selected.iter().map(|&i| self.services[i].period()).max() else {
            debug!(sleep = ?self.sleep_time(now), "no services due");
            return CheckPass::default();
        };

        let outcomes = self.run_checks(&selected).await;

        let mut results = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes {
            let service = &mut self.services[index];
            debug!(
                service = %service,
                last_checked = %describe_age(service.last_checked(), now),
                state = %outcome.result.state,
                info = %outcome.result.info.trim_end(),
                "checked service"
            );
            service.record_lag(outcome.lag);
            service.mark_checked(now);
            results.push(outcome.result);
        }

        CheckPass { period, results }
    }

    /// Indices of services whose `due_in(now)` is within the largest known lag.
    pub fn select_due(&self, now: Instant) -> Vec<usize> {
        let max_lag = self.max_lag();
        self.services
            .iter()
            .enumerate()
            .filter(|(_, s)| s.due_in(now) <= max_lag)
            .map(|(i, _)| i)
            .collect()
    }

    /// The slowest currently known check.
    pub fn max_lag(&self) -> Duration {
        self.services
            .iter()
            .map(Service::lag)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Run the given services' checks as one task each and wait for all of them.
    async fn run_checks(&self, indices: &[usize]) -> Vec<(usize, CheckOutcome)> {
        let mut tasks = JoinSet::new();
        for &index in indices {
            let executor = self.executor.clone();
            let command = self.services[index].command().clone();
            tasks.spawn(async move { (index, executor.run(&command).await) });
        }

        let mut outcomes = Vec::with_capacity(indices.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                // The service keeps its old timestamp and is retried next pass.
                Err(e) => error!(error = %e, "check task failed"),
            }
        }
        outcomes
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Always false for a constructed monitor.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn describe_age(last_checked: Option<Instant>, now: Instant) -> String {
    match last_checked {
        Some(at) => format!("{:?} ago", now.saturating_duration_since(at)),
        None => "(never)".to_string(),
    }
}
