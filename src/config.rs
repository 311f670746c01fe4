//! Configuration management for procexec.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file (JSON)
//! 3. Default values

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::EnvProvider;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution defaults.
    pub execution: ExecutionSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Execution configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Timeout applied to commands that do not set their own.
    pub default_timeout_ms: Option<u64>,
    /// Time between the polite termination signal and the forced kill.
    pub kill_grace_ms: u64,
    /// How long to keep draining output after a timed-out child was killed.
    pub drain_ms: u64,
    /// Suppress diagnostic echo by default.
    pub silent: bool,
    /// Shell used in shell mode (`sh` / `cmd` when unset).
    pub shell: Option<String>,
    /// Variable naming the default working directory.
    pub working_dir_var: Option<String>,
    /// Variables copied from the environment provider into every child.
    pub passthrough_env: Vec<String>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            default_timeout_ms: None,
            kill_grace_ms: 2000,
            drain_ms: 500,
            silent: false,
            shell: None,
            working_dir_var: None,
            passthrough_env: Vec::new(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Runtime settings shared by both executors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSettings {
    pub default_timeout: Option<Duration>,
    pub kill_grace: Duration,
    pub drain_window: Duration,
    pub silent: bool,
    pub shell: Option<String>,
    pub working_dir_var: Option<String>,
    pub passthrough_env: Vec<String>,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Config::default().exec_settings()
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self, env: &dyn EnvProvider) -> Result<(), ConfigError> {
        if let Some(ms) = env.get("PROCEXEC_DEFAULT_TIMEOUT_MS") {
            self.execution.default_timeout_ms = Some(parse_var("PROCEXEC_DEFAULT_TIMEOUT_MS", &ms)?);
        }

        if let Some(ms) = env.get("PROCEXEC_KILL_GRACE_MS") {
            self.execution.kill_grace_ms = parse_var("PROCEXEC_KILL_GRACE_MS", &ms)?;
        }

        if let Some(ms) = env.get("PROCEXEC_DRAIN_MS") {
            self.execution.drain_ms = parse_var("PROCEXEC_DRAIN_MS", &ms)?;
        }

        if let Some(silent) = env.get("PROCEXEC_SILENT") {
            self.execution.silent = parse_flag("PROCEXEC_SILENT", &silent)?;
        }

        if let Some(shell) = env.get("PROCEXEC_SHELL") {
            if !shell.is_empty() {
                self.execution.shell = Some(shell);
            }
        }

        if let Some(var) = env.get("PROCEXEC_WORKING_DIR_VAR") {
            if !var.is_empty() {
                self.execution.working_dir_var = Some(var);
            }
        }

        if let Some(level) = env.get("PROCEXEC_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = env.get("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: env vars > config file > defaults
    pub fn load(path: Option<&Path>, env: &dyn EnvProvider) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env(env)?;

        Ok(config)
    }

    /// Convert to the runtime settings used by the executors.
    pub fn exec_settings(&self) -> ExecSettings {
        let exec = &self.execution;
        ExecSettings {
            default_timeout: exec.default_timeout_ms.map(Duration::from_millis),
            kill_grace: Duration::from_millis(exec.kill_grace_ms),
            drain_window: Duration::from_millis(exec.drain_ms),
            silent: exec.silent,
            shell: exec.shell.clone(),
            working_dir_var: exec.working_dir_var.clone(),
            passthrough_env: exec.passthrough_env.clone(),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// An environment override could not be parsed.
    InvalidValue { name: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidValue { name, value } => {
                write!(f, "invalid value for {}: {:?}", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
