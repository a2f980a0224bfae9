//! vigil.toml configuration parser.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::split_command;
use crate::error::{ConfigError, ConfigResult};
use crate::types::AlertTarget;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Consecutive FAIL/UNK results before a service alert is sent.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Optional per-check timeout ("500ms", "30s", "2m"). Unset means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_timeout: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            check_timeout: None,
        }
    }
}

fn default_failure_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Nominal check period, seconds.
    pub period: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    pub command: String,
}

impl ServiceConfig {
    /// The command split into argv words.
    pub fn argv(&self) -> ConfigResult<Vec<String>> {
        split_command(&self.command)
    }

    /// Working directory, defaulting to the current directory.
    pub fn working_dir(&self) -> PathBuf {
        self.cwd.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
            targets: BTreeMap::new(),
        }
    }
}

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("alert.d")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl VigilConfig {
    /// Load, validate, and anchor relative paths at the config file's directory.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.anchor_paths(base);
        }
        Ok(config)
    }

    /// Parse and validate a config document.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: VigilConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.agent.failure_threshold == 0 {
            return Err(ConfigError::FailureThreshold);
        }
        self.check_timeout()?;

        let mut seen = HashSet::new();
        for service in &self.services {
            let invalid = |reason: &str| ConfigError::Service {
                name: service.name.clone(),
                reason: reason.to_string(),
            };
            if service.name.trim().is_empty() {
                return Err(invalid("name must not be empty"));
            }
            if !service.period.is_finite() || service.period <= 0.0 {
                return Err(invalid("period must be a positive number of seconds"));
            }
            if service.argv()?.is_empty() {
                return Err(invalid("command must not be empty"));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }
        }

        for (name, target) in &self.alerts.targets {
            if target.executable.as_os_str().is_empty() {
                return Err(ConfigError::AlertTarget {
                    name: name.clone(),
                    reason: "executable must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The configured check timeout, if any.
    pub fn check_timeout(&self) -> ConfigResult<Option<Duration>> {
        self.agent
            .check_timeout
            .as_deref()
            .map(|s| parse_duration(s).ok_or_else(|| ConfigError::Duration(s.to_string())))
            .transpose()
    }

    /// Alert targets in plugin-name order.
    pub fn alert_targets(&self) -> Vec<AlertTarget> {
        self.alerts
            .targets
            .iter()
            .map(|(name, t)| AlertTarget::new(name.clone(), t.executable.clone(), t.args.clone()))
            .collect()
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A minimal vigil.toml with one service and one alert target.
    pub fn scaffold() -> Self {
        let mut targets = BTreeMap::new();
        targets.insert(
            "email".to_string(),
            TargetConfig {
                executable: PathBuf::from("./email.sh"),
                args: vec!["ops@example.com".to_string()],
            },
        );
        VigilConfig {
            agent: AgentConfig {
                failure_threshold: 3,
                check_timeout: Some("30s".to_string()),
            },
            services: vec![ServiceConfig {
                name: "nginx".to_string(),
                period: 60.0,
                cwd: Some(PathBuf::from("plugin.d")),
                command: "./check_http.sh localhost 80".to_string(),
            }],
            alerts: AlertsConfig {
                plugins_dir: default_plugins_dir(),
                targets,
            },
        }
    }

    fn anchor_paths(&mut self, base: &Path) {
        for service in &mut self.services {
            service.cwd = Some(match service.cwd.take() {
                Some(cwd) if cwd.is_relative() => base.join(cwd),
                Some(cwd) => cwd,
                None => base.to_path_buf(),
            });
        }
        if self.alerts.plugins_dir.is_relative() {
            self.alerts.plugins_dir = base.join(&self.alerts.plugins_dir);
        }
    }
}

/// Parse a duration string like "5s", "500ms", "1m", or plain seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
