//! Alert dispatcher: fans a message out to every notification plugin.
//!
//! A call to [`AlertDispatcher::send_alert`] makes at most two passes:
//!
//! 1. **Primary**: the message goes to every target concurrently. Plugins
//!    that cannot be invoked are recorded as failures.
//! 2. **Escalation**: if anything failed, one report listing every failure
//!    goes to every target, failed ones included. Failures here are logged
//!    and dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, error, info};

use vigil_core::AlertTarget;

use crate::error::AlertError;
use crate::launcher::{PluginLauncher, ProcessLauncher};

/// A plugin that could not be invoked.
#[derive(Debug)]
pub struct PluginFailure {
    pub plugin_name: String,
    pub error: AlertError,
}

impl fmt::Display for PluginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Alert plugin '{}' failed: {}", self.plugin_name, self.error)
    }
}

/// What happened during one `send_alert` call.
#[derive(Debug, Default)]
pub struct AlertReport {
    /// Failures of the primary pass. Non-empty means an escalation was sent.
    pub failures: Vec<PluginFailure>,
    /// Failures of the escalation pass (already logged).
    pub escalation_failures: Vec<PluginFailure>,
}

impl AlertReport {
    pub fn escalated(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Build the escalation report: one line per failure.
pub fn escalation_message(failures: &[PluginFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fans alert messages out to the configured plugins.
pub struct AlertDispatcher<L = ProcessLauncher> {
    plugins_dir: PathBuf,
    targets: Arc<[AlertTarget]>,
    launcher: Arc<L>,
    dispatch: Dispatch,
}

impl AlertDispatcher<ProcessLauncher> {
    /// Create a dispatcher that runs plugins as child processes in `plugins_dir`.
    pub fn new(plugins_dir: impl Into<PathBuf>, targets: Vec<AlertTarget>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            targets: targets.into(),
            launcher: Arc::new(ProcessLauncher),
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }
}

impl<L: PluginLauncher> AlertDispatcher<L> {
    /// Swap the way plugins are invoked.
    pub fn with_launcher<M: PluginLauncher>(self, launcher: M) -> AlertDispatcher<M> {
        AlertDispatcher {
            plugins_dir: self.plugins_dir,
            targets: self.targets,
            launcher: Arc::new(launcher),
            dispatch: self.dispatch,
        }
    }

    /// Send this dispatcher's log events to `dispatch`.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn targets(&self) -> &[AlertTarget] {
        &self.targets
    }

    /// Deliver `message` to every target, escalating invocation failures once.
    ///
    /// Never fails; the report says what went wrong.
    pub async fn send_alert(&self, message: &str) -> AlertReport {
        self.deliver(message)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn deliver(&self, message: &str) -> AlertReport {
        if self.targets.is_empty() {
            debug!("no alert targets configured, alert dropped");
            return AlertReport::default();
        }

        let failures = self.fan_out(message).await;
        if failures.is_empty() {
            debug!(targets = self.targets.len(), "alert delivered");
            return AlertReport::default();
        }

        let report = escalation_message(&failures);
        info!(
            failed = failures.len(),
            targets = self.targets.len(),
            "alert plugins failed, escalating"
        );

        let escalation_failures = self.fan_out(&report).await;
        for failure in &escalation_failures {
            error!(
                plugin = %failure.plugin_name,
                error = %failure.error,
                "failed to send alert plugin failure notification"
            );
        }

        AlertReport {
            failures,
            escalation_failures,
        }
    }

    /// Send `message` to every target concurrently and collect the failures.
    async fn fan_out(&self, message: &str) -> Vec<PluginFailure> {
        let message: Arc<str> = Arc::from(message);
        let mut tasks = JoinSet::new();

        for target in self.targets.iter().cloned() {
            let launcher = Arc::clone(&self.launcher);
            let plugins_dir = self.plugins_dir.clone();
            let message = Arc::clone(&message);
            let task = async move {
                let result = launcher.launch(&plugins_dir, &target, &message).await;
                (target.plugin_name, result)
            };
            tasks.spawn(task.with_subscriber(self.dispatch.clone()));
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((plugin_name, Err(error))) => {
                    debug!(plugin = %plugin_name, error = %error, "alert plugin failed");
                    failures.push(PluginFailure { plugin_name, error });
                }
                Err(e) => {
                    error!(error = %e, "alert plugin task failed");
                    failures.push(PluginFailure {
                        plugin_name: "<unknown>".to_string(),
                        error: AlertError::Other(e.to_string()),
                    });
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;
    use crate::error::AlertResult;

    /// Records every delivery; plugins named in `failing` fail on every call.
    #[derive(Default)]
    struct RecordingLauncher {
        deliveries: Arc<Mutex<Vec<(String, String)>>>,
        failing: HashSet<String>,
    }

    impl RecordingLauncher {
        fn failing(names: &[&str]) -> Self {
            Self {
                deliveries: Arc::default(),
                failing: names.iter().map(|n| n.to_string()).collect(),
            }
        }
    }

    impl PluginLauncher for RecordingLauncher {
        async fn launch(
            &self,
            _plugins_dir: &Path,
            target: &AlertTarget,
            message: &str,
        ) -> AlertResult<()> {
            self.deliveries
                .lock()
                .unwrap()
                .push((target.plugin_name.clone(), message.to_string()));
            if self.failing.contains(&target.plugin_name) {
                return Err(AlertError::Other(format!("{} is down", target.plugin_name)));
            }
            Ok(())
        }
    }

    fn targets(names: &[&str]) -> Vec<AlertTarget> {
        names
            .iter()
            .map(|n| AlertTarget::new(*n, format!("./{n}.sh"), vec![]))
            .collect()
    }

    fn dispatcher(
        names: &[&str],
        launcher: RecordingLauncher,
    ) -> (AlertDispatcher<RecordingLauncher>, Arc<Mutex<Vec<(String, String)>>>) {
        let deliveries = Arc::clone(&launcher.deliveries);
        let d = AlertDispatcher::new("/etc/vigil/alert.d", targets(names)).with_launcher(launcher);
        (d, deliveries)
    }

    #[tokio::test]
    async fn all_targets_receive_message() {
        let (d, deliveries) = dispatcher(&["a", "b", "c"], RecordingLauncher::default());
        let report = d.send_alert("service down").await;

        assert!(!report.escalated());
        let mut got = deliveries.lock().unwrap().clone();
        got.sort();
        assert_eq!(
            got,
            [
                ("a".to_string(), "service down".to_string()),
                ("b".to_string(), "service down".to_string()),
                ("c".to_string(), "service down".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn one_failure_escalates_once_to_every_target() {
        let (d, deliveries) = dispatcher(&["a", "b", "c"], RecordingLauncher::failing(&["b"]));
        let report = d.send_alert("service down").await;

        assert!(report.escalated());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].plugin_name, "b");
        // b fails again on the escalation pass.
        assert_eq!(report.escalation_failures.len(), 1);

        let deliveries = deliveries.lock().unwrap().clone();
        assert_eq!(deliveries.len(), 6);

        let escalations: Vec<_> = deliveries
            .iter()
            .filter(|(_, msg)| msg != "service down")
            .collect();
        let recipients: HashSet<&str> = escalations.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(recipients, HashSet::from(["a", "b", "c"]));

        let messages: HashSet<&str> = escalations.iter().map(|(_, m)| m.as_str()).collect();
        assert_eq!(messages.len(), 1, "exactly one escalation message");
        assert_eq!(
            *messages.iter().next().unwrap(),
            "Alert plugin 'b' failed: b is down"
        );
    }

    #[tokio::test]
    async fn escalation_aggregates_all_failures() {
        let (d, deliveries) = dispatcher(&["a", "b", "c"], RecordingLauncher::failing(&["a", "c"]));
        let report = d.send_alert("boom").await;
        assert_eq!(report.failures.len(), 2);

        let deliveries = deliveries.lock().unwrap();
        let escalation = deliveries
            .iter()
            .find(|(p, m)| p == "b" && m != "boom")
            .map(|(_, m)| m.clone())
            .unwrap();
        let mut lines: Vec<&str> = escalation.lines().collect();
        lines.sort();
        assert_eq!(
            lines,
            [
                "Alert plugin 'a' failed: a is down",
                "Alert plugin 'c' failed: c is down",
            ]
        );
    }

    #[tokio::test]
    async fn at_most_two_passes_when_everything_fails() {
        let (d, deliveries) = dispatcher(&["a", "b"], RecordingLauncher::failing(&["a", "b"]));
        let report = d.send_alert("boom").await;

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.escalation_failures.len(), 2);
        assert_eq!(deliveries.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn no_targets_is_a_no_op() {
        let (d, deliveries) = dispatcher(&[], RecordingLauncher::default());
        let report = d.send_alert("anyone?").await;
        assert!(!report.escalated());
        assert!(deliveries.lock().unwrap().is_empty());
    }

    #[test]
    fn escalation_message_format() {
        let failures = vec![
            PluginFailure {
                plugin_name: "email".to_string(),
                error: AlertError::Other("smtp refused".to_string()),
            },
            PluginFailure {
                plugin_name: "sms".to_string(),
                error: AlertError::Other("no credit".to_string()),
            },
        ];
        assert_eq!(
            escalation_message(&failures),
            "Alert plugin 'email' failed: smtp refused\nAlert plugin 'sms' failed: no credit"
        );
    }
}
