//! Check plugin execution.
//!
//! Spawns a service's check command, captures stdout and stderr through a
//! single pipe so they interleave as written, and maps the exit status
//! onto a [`CheckState`]. Every failure mode (missing executable, wait
//! error, timeout, odd exit code) becomes an `UNK` result; nothing is
//! returned as an error.

use std::io;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::process::Child;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, error, warn};

use vigil_core::{CheckResult, CheckState};

/// How to invoke one service's check plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckCommand {
    pub name: String,
    pub working_dir: PathBuf,
    /// Program followed by its arguments. Never empty.
    pub argv: Vec<String>,
}

impl CheckCommand {
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            working_dir: working_dir.into(),
            argv,
        }
    }

    /// The program to execute.
    ///
    /// A relative path with a separator (`./check.sh`, `bin/probe`) is
    /// resolved against the working directory; bare names go through `PATH`.
    pub fn program(&self) -> PathBuf {
        let program = Path::new(self.argv.first().map(String::as_str).unwrap_or_default());
        if program.is_relative() && program.components().count() > 1 {
            self.working_dir.join(program)
        } else {
            program.to_path_buf()
        }
    }

    fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }
}

/// Result of one check execution plus its measured wall-clock latency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub result: CheckResult,
    pub lag: Duration,
}

/// Runs check plugins.
///
/// Logging goes to the `Dispatch` captured at construction (or injected via
/// [`with_dispatch`](Self::with_dispatch)), never to an implicit global.
#[derive(Clone)]
pub struct CheckExecutor {
    timeout: Option<Duration>,
    dispatch: Dispatch,
}

impl Default for CheckExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckExecutor {
    /// Create an executor with no timeout, logging to the current dispatcher.
    pub fn new() -> Self {
        Self {
            timeout: None,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Kill and report `UNK` for checks running longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send this executor's log events to `dispatch`.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run a check and measure how long it took.
    pub async fn run(&self, command: &CheckCommand) -> CheckOutcome {
        let started = Instant::now();
        let result = self
            .execute(command)
            .with_subscriber(self.dispatch.clone())
            .await;
        CheckOutcome {
            result,
            lag: started.elapsed(),
        }
    }

    async fn execute(&self, command: &CheckCommand) -> CheckResult {
        let name = command.name.as_str();
        let program = command.program();

        let spawned = merged_output().and_then(|(reader, stdout, stderr)| {
            let mut cmd = tokio::process::Command::new(&program);
            cmd.args(command.args())
                .current_dir(&command.working_dir)
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(stderr)
                .kill_on_drop(true);
            // `cmd` holds our copies of the write end; dropping it lets the
            // reader see EOF once the child exits.
            cmd.spawn().map(|child| (child, reader))
        });

        let (child, reader) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                let info = format!("Failed to execute plugin `{name}`: {e}");
                error!(service = %name, program = %program.display(), error = %e, "failed to execute check plugin");
                return CheckResult::new(name, CheckState::Unknown, info);
            }
        };

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait_merged(child, reader)).await {
                Ok(waited) => waited,
                Err(_) => {
                    // Dropping the wait future drops the child, which kills it.
                    warn!(service = %name, timeout = ?limit, "check plugin timed out");
                    return CheckResult::new(
                        name,
                        CheckState::Unknown,
                        format!("check timed out after {limit:?}"),
                    );
                }
            },
            None => wait_merged(child, reader).await,
        };

        let output = match waited {
            Ok(output) => output,
            Err(e) => {
                let info = format!("Failed to wait for plugin `{name}`: {e}");
                error!(service = %name, error = %e, "failed to collect check plugin output");
                return CheckResult::new(name, CheckState::Unknown, info);
            }
        };

        let info = String::from_utf8_lossy(&output.text).into_owned();

        let state = match output.status.code().and_then(CheckState::from_exit_code) {
            Some(state) => state,
            None => {
                error!(
                    service = %name,
                    code = ?output.status.code(),
                    status = %output.status,
                    output = %info,
                    "check plugin exited with unexpected code"
                );
                CheckState::Unknown
            }
        };

        CheckResult::new(name, state, info)
    }
}

/// Exit status and everything the plugin wrote, in write order.
struct MergedOutput {
    status: ExitStatus,
    text: Vec<u8>,
}

/// One pipe handed to the child as both stdout and stderr.
fn merged_output() -> io::Result<(pipe::Receiver, Stdio, Stdio)> {
    let (reader, writer) = io::pipe()?;
    let stderr = writer.try_clone()?;
    let reader = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
    Ok((reader, Stdio::from(writer), Stdio::from(stderr)))
}

async fn wait_merged(mut child: Child, mut reader: pipe::Receiver) -> io::Result<MergedOutput> {
    let mut text = Vec::new();
    let (read, status) = tokio::join!(reader.read_to_end(&mut text), child.wait());
    read?;
    Ok(MergedOutput {
        status: status?,
        text,
    })
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capturing_executor() -> (CheckExecutor, LogBuffer) {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let executor = CheckExecutor::new().with_dispatch(Dispatch::new(subscriber));
        (executor, logs)
    }

    fn shell(name: &str, script: &str) -> CheckCommand {
        CheckCommand::new(
            name,
            ".",
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        )
    }

    #[tokio::test]
    async fn exit_codes_map_to_states() {
        let executor = CheckExecutor::new();
        let cases = [
            (0, CheckState::Ok),
            (1, CheckState::Warn),
            (2, CheckState::Fail),
            (3, CheckState::Unknown),
        ];
        for (code, expected) in cases {
            let outcome = executor.run(&shell("svc", &format!("exit {code}"))).await;
            assert_eq!(outcome.result.state, expected, "exit code {code}");
            assert_eq!(outcome.result.name, "svc");
        }
    }

    #[tokio::test]
    async fn unexpected_code_is_unknown_and_logged() {
        let (executor, logs) = capturing_executor();
        let outcome = executor.run(&shell("probe", "echo boom; exit 7")).await;

        assert_eq!(outcome.result.state, CheckState::Unknown);
        assert_eq!(outcome.result.info, "boom\n");

        let logs = logs.contents();
        assert!(logs.contains("ERROR"), "{logs}");
        assert!(logs.contains("unexpected code"), "{logs}");
        assert!(logs.contains("code=Some(7)"), "{logs}");
        assert!(logs.contains("service=probe"), "{logs}");
    }

    #[tokio::test]
    async fn killed_by_signal_is_unknown() {
        let (executor, logs) = capturing_executor();
        let outcome = executor.run(&shell("sig", "kill -9 $$")).await;
        assert_eq!(outcome.result.state, CheckState::Unknown);
        assert!(logs.contents().contains("code=None"));
    }

    #[tokio::test]
    async fn output_includes_stdout_and_stderr() {
        let executor = CheckExecutor::new();
        let outcome = executor
            .run(&shell("noisy", "echo to-out; echo to-err >&2; exit 1"))
            .await;
        assert_eq!(outcome.result.state, CheckState::Warn);
        assert_eq!(outcome.result.info, "to-out\nto-err\n");
    }

    #[tokio::test]
    async fn stdout_and_stderr_keep_write_order() {
        let outcome = CheckExecutor::new()
            .run(&shell(
                "interleaved",
                "echo a; sleep 0.05; echo b >&2; sleep 0.05; echo c",
            ))
            .await;
        assert_eq!(outcome.result.state, CheckState::Ok);
        assert_eq!(outcome.result.info, "a\nb\nc\n");
    }

    #[tokio::test]
    async fn timeout_does_not_wait_for_inherited_pipe() {
        // The backgrounded sleep keeps the write end open after sh is killed.
        let executor = CheckExecutor::new().with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let outcome = executor.run(&shell("orphan", "sleep 3 & wait")).await;
        assert_eq!(outcome.result.state, CheckState::Unknown);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn missing_executable_is_unknown_with_description() {
        let (executor, logs) = capturing_executor();
        let command = CheckCommand::new(
            "ghost",
            ".",
            vec!["/nonexistent/vigil-check-plugin".to_string()],
        );
        let outcome = executor.run(&command).await;

        assert_eq!(outcome.result.state, CheckState::Unknown);
        assert!(outcome.result.info.starts_with("Failed to execute plugin `ghost`"));
        assert!(logs.contents().contains("failed to execute check plugin"));
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "present").unwrap();

        let command = CheckCommand::new(
            "cwd",
            dir.path(),
            vec!["cat".to_string(), "marker".to_string()],
        );
        let outcome = CheckExecutor::new().run(&command).await;
        assert_eq!(outcome.result.state, CheckState::Ok);
        assert_eq!(outcome.result.info, "present");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn relative_program_resolves_against_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/bin/sh", dir.path().join("probe")).unwrap();

        let command = CheckCommand::new(
            "relative",
            dir.path(),
            vec!["./probe".to_string(), "-c".to_string(), "exit 2".to_string()],
        );
        assert_eq!(command.program(), dir.path().join("./probe"));

        let outcome = CheckExecutor::new().run(&command).await;
        assert_eq!(outcome.result.state, CheckState::Fail);
    }

    #[test]
    fn bare_program_uses_path_lookup() {
        let command = CheckCommand::new("x", "/srv", vec!["true".to_string()]);
        assert_eq!(command.program(), PathBuf::from("true"));
        let command = CheckCommand::new("x", "/srv", vec!["/bin/true".to_string()]);
        assert_eq!(command.program(), PathBuf::from("/bin/true"));
    }

    #[tokio::test]
    async fn lag_measures_execution_time() {
        let outcome = CheckExecutor::new().run(&shell("slow", "sleep 0.2")).await;
        assert_eq!(outcome.result.state, CheckState::Ok);
        assert!(outcome.lag >= Duration::from_millis(200), "{:?}", outcome.lag);
    }

    #[tokio::test]
    async fn timeout_reports_unknown() {
        let executor = CheckExecutor::new().with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let outcome = executor.run(&shell("hung", "sleep 5")).await;

        assert_eq!(outcome.result.state, CheckState::Unknown);
        assert!(outcome.result.info.starts_with("check timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn no_timeout_by_default() {
        assert_eq!(CheckExecutor::new().timeout(), None);
    }
}
