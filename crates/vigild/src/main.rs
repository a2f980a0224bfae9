//! vigild: the Vigil health-check agent.
//!
//! # Usage
//!
//! ```text
//! vigild run --config /etc/vigil/vigil.toml
//! vigild check --config vigil.toml
//! vigild plugins --dir /etc/vigil/alert.d
//! vigild init > vigil.toml
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, info, warn};
use tracing_subscriber::EnvFilter;

use vigil_core::VigilConfig;
use vigil_health::CheckExecutor;
use vigil_scheduler::{Service, ServicesMonitor};
use vigild::{Agent, pass_to_json};

const DEFAULT_FILTER: &str = "info,vigild=debug,vigil=debug";

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil health-check agent")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent until interrupted.
    Run {
        /// Path to vigil.toml.
        #[arg(long, short, default_value = "/etc/vigil/vigil.toml")]
        config: PathBuf,
    },
    /// Run every check once and print the results as JSON.
    Check {
        #[arg(long, short, default_value = "/etc/vigil/vigil.toml")]
        config: PathBuf,
    },
    /// List the alert plugins installed in a directory.
    Plugins {
        /// Plugin directory. Defaults to the one named in the config.
        #[arg(long)]
        dir: Option<PathBuf>,

        #[arg(long, short, default_value = "/etc/vigil/vigil.toml")]
        config: PathBuf,
    },
    /// Print a starter vigil.toml.
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dispatch = build_dispatch(cli.log_format);

    run_command(cli.command, dispatch.clone())
        .with_subscriber(dispatch)
        .await
}

/// Logs go to stderr so `check` output on stdout stays machine-readable.
fn build_dispatch(format: LogFormat) -> Dispatch {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => Dispatch::new(builder.finish()),
        LogFormat::Json => Dispatch::new(builder.json().finish()),
    }
}

async fn run_command(command: Command, dispatch: Dispatch) -> anyhow::Result<()> {
    match command {
        Command::Run { config } => run_agent(config, dispatch).await,
        Command::Check { config } => check_once(config, dispatch).await,
        Command::Plugins { dir, config } => list_plugins(dir, config),
        Command::Init => {
            print!("{}", VigilConfig::scaffold().to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<VigilConfig> {
    VigilConfig::from_file(path).with_context(|| format!("failed to load {}", path.display()))
}

async fn run_agent(config_path: PathBuf, dispatch: Dispatch) -> anyhow::Result<()> {
    let config = load_config(&config_path)?;
    info!(
        config = %config_path.display(),
        services = config.services.len(),
        targets = config.alerts.targets.len(),
        "vigil agent starting"
    );

    if config.services.is_empty() {
        warn!("no services configured, nothing to do");
        return Ok(());
    }

    let mut agent = Agent::from_config(&config, dispatch.clone()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => warn!(error = %e, "failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    };
    let signal_handle = tokio::spawn(signal.with_subscriber(dispatch));

    agent.run(shutdown_rx).await;
    signal_handle.abort();

    info!("vigil agent stopped");
    Ok(())
}

async fn check_once(config_path: PathBuf, dispatch: Dispatch) -> anyhow::Result<()> {
    let config = load_config(&config_path)?;
    if config.services.is_empty() {
        println!("{}", serde_json::json!({ "period": 0.0, "services": [] }));
        return Ok(());
    }

    let services = config
        .services
        .iter()
        .map(Service::from_config)
        .collect::<Result<Vec<_>, _>>()?;
    let mut executor = CheckExecutor::new().with_dispatch(dispatch);
    if let Some(timeout) = config.check_timeout()? {
        executor = executor.with_timeout(timeout);
    }

    // Uncalibrated: every service is due once and runs exactly once.
    let mut monitor = ServicesMonitor::uncalibrated(services, executor)?;
    let pass = monitor.check_pass(Instant::now()).await;

    println!("{}", serde_json::to_string_pretty(&pass_to_json(&pass))?);
    Ok(())
}

fn list_plugins(dir: Option<PathBuf>, config_path: PathBuf) -> anyhow::Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => load_config(&config_path)?.alerts.plugins_dir,
    };
    for plugin in vigil_alert::list_alert_plugins(&dir)? {
        println!("{plugin}");
    }
    Ok(())
}
