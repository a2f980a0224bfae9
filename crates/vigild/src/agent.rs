//! The agent loop: sleep, check what is due, report, alert on persistent failure.

use std::collections::HashMap;
use std::time::Instant;

use anyhow::Context;
use tokio::sync::watch;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, info, warn};

use vigil_alert::{AlertDispatcher, PluginLauncher, ProcessLauncher};
use vigil_core::{CheckResult, VigilConfig};
use vigil_health::{CheckExecutor, FailureTracker, Transition};
use vigil_scheduler::{CheckPass, Service, ServicesMonitor};

use crate::reporter::{LogReporter, Reporter};

pub struct Agent<R = LogReporter, L = ProcessLauncher> {
    monitor: ServicesMonitor,
    dispatcher: AlertDispatcher<L>,
    reporter: R,
    trackers: HashMap<String, FailureTracker>,
    failure_threshold: u32,
    dispatch: Dispatch,
}

impl Agent {
    /// Build every component from a validated config and calibrate the services.
    pub async fn from_config(config: &VigilConfig, dispatch: Dispatch) -> anyhow::Result<Self> {
        let services = config
            .services
            .iter()
            .map(Service::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        let mut executor = CheckExecutor::new().with_dispatch(dispatch.clone());
        if let Some(timeout) = config.check_timeout()? {
            executor = executor.with_timeout(timeout);
        }
        let monitor = ServicesMonitor::with_executor(services, executor)
            .await
            .context("failed to start services monitor")?;

        let dispatcher = AlertDispatcher::new(&config.alerts.plugins_dir, config.alert_targets())
            .with_dispatch(dispatch.clone());

        Ok(Agent::new(monitor, dispatcher, LogReporter, config.agent.failure_threshold)
            .with_dispatch(dispatch))
    }
}

impl<R: Reporter, L: PluginLauncher> Agent<R, L> {
    pub fn new(
        monitor: ServicesMonitor,
        dispatcher: AlertDispatcher<L>,
        reporter: R,
        failure_threshold: u32,
    ) -> Self {
        Self {
            monitor,
            dispatcher,
            reporter,
            trackers: HashMap::new(),
            failure_threshold,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn monitor(&self) -> &ServicesMonitor {
        &self.monitor
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Whether `service` has an outstanding failure alert.
    pub fn is_alerting(&self, service: &str) -> bool {
        self.trackers
            .get(service)
            .is_some_and(FailureTracker::is_alerting)
    }

    /// Run check passes until `shutdown` flips or its sender goes away.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) {
        let dispatch = self.dispatch.clone();
        self.run_loop(shutdown).with_subscriber(dispatch).await
    }

    async fn run_loop(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(services = self.monitor.len(), "agent started");

        while !*shutdown.borrow() {
            let sleep = self.monitor.sleep_time(Instant::now());
            debug!(?sleep, "waiting for next check pass");
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {
                    self.handle_pass(Instant::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("agent shutting down");
    }

    /// One pass at `now`: check, report, update failure tracking.
    pub async fn tick(&mut self, now: Instant) -> CheckPass {
        let dispatch = self.dispatch.clone();
        self.handle_pass(now).with_subscriber(dispatch).await
    }

    async fn handle_pass(&mut self, now: Instant) -> CheckPass {
        let pass = self.monitor.check_pass(now).await;
        if pass.is_empty() {
            return pass;
        }
        self.reporter.report(&pass);
        for result in &pass.results {
            self.track(result).await;
        }
        pass
    }

    async fn track(&mut self, result: &CheckResult) {
        let threshold = self.failure_threshold;
        let tracker = self
            .trackers
            .entry(result.name.clone())
            .or_insert_with(|| FailureTracker::new(threshold));

        let message = match tracker.record(result.state) {
            Transition::None => return,
            Transition::Alert => {
                warn!(service = %result.name, state = %result.state, "sending failure alert");
                alert_message(result, tracker.consecutive_failures())
            }
            Transition::Recovered => {
                info!(service = %result.name, state = %result.state, "sending recovery notice");
                recovery_message(result)
            }
        };

        let report = self.dispatcher.send_alert(&message).await;
        if report.escalated() {
            warn!(
                service = %result.name,
                failed_plugins = report.failures.len(),
                "some alert plugins could not be reached"
            );
        }
    }
}

fn alert_message(result: &CheckResult, failures: u32) -> String {
    format!(
        "Service '{}' is {} after {} consecutive failed checks\n{}",
        result.name,
        result.state,
        failures,
        result.info.trim_end()
    )
}

fn recovery_message(result: &CheckResult) -> String {
    format!(
        "Service '{}' recovered: {}\n{}",
        result.name,
        result.state,
        result.info.trim_end()
    )
}
