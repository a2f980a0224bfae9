//! Alert plugin invocation.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use vigil_core::AlertTarget;

use crate::error::{AlertError, AlertResult};

/// Delivers one alert message to one plugin.
///
/// The dispatcher calls this once per target per fan-out pass, each call in
/// its own task.
pub trait PluginLauncher: Send + Sync + 'static {
    fn launch(
        &self,
        plugins_dir: &Path,
        target: &AlertTarget,
        message: &str,
    ) -> impl Future<Output = AlertResult<()>> + Send;
}

/// Runs the plugin as a child process with the message on stdin.
///
/// The plugin's output is collected and discarded; its exit code is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl PluginLauncher for ProcessLauncher {
    async fn launch(
        &self,
        plugins_dir: &Path,
        target: &AlertTarget,
        message: &str,
    ) -> AlertResult<()> {
        let program = resolve_program(plugins_dir, &target.executable).await;

        let mut child = tokio::process::Command::new(&program)
            .args(&target.args)
            .current_dir(plugins_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AlertError::Spawn {
                executable: program.clone(),
                source,
            })?;

        // Feed stdin while draining output so a chatty plugin cannot stall us.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            stdin.write_all(message.as_bytes()).await?;
            stdin.shutdown().await
            // stdin dropped here: the plugin sees EOF.
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(AlertError::Wait)?;
        match fed {
            Ok(()) => {}
            // The plugin exited without reading everything. It ran; that is enough.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(plugin = %target.plugin_name, "alert plugin closed stdin early");
            }
            Err(e) => return Err(AlertError::Stdin(e)),
        }

        debug!(
            plugin = %target.plugin_name,
            status = %output.status,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "alert plugin finished"
        );
        Ok(())
    }
}

/// Resolve a plugin executable against the plugin directory.
///
/// Absolute paths are used as is. A relative path is taken from the plugin
/// directory when it exists there or contains a separator; otherwise it is
/// left for `PATH` lookup.
pub async fn resolve_program(plugins_dir: &Path, executable: &Path) -> PathBuf {
    if executable.is_absolute() {
        return executable.to_path_buf();
    }
    let local = plugins_dir.join(executable);
    let in_plugins_dir = tokio::fs::metadata(&local)
        .await
        .is_ok_and(|meta| meta.is_file());
    if in_plugins_dir || executable.components().count() > 1 {
        local
    } else {
        executable.to_path_buf()
    }
}
