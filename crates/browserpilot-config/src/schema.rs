//! Configuration schema.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Workflow storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Agent runner bridge settings.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workflow storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON record per workflow.
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

fn default_storage_dir() -> String {
    "~/.browserpilot/workflows".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

impl StorageConfig {
    /// Storage directory with `~` expanded.
    pub fn dir_path(&self) -> PathBuf {
        PathBuf::from(crate::loader::ConfigLoader::expand_path(&self.dir))
    }
}

/// Agent runner bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Command spawned per instruction (the operator's browser bridge).
    #[serde(default = "default_runner_command")]
    pub command: String,

    /// Arguments passed to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_runner_timeout")]
    pub timeout_seconds: u64,
}

fn default_runner_command() -> String {
    "browserpilot-agent".to_string()
}

fn default_runner_timeout() -> u64 {
    600
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: default_runner_command(),
            args: Vec::new(),
            timeout_seconds: default_runner_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files.
    #[serde(default = "default_log_dir")]
    pub dir: String,

    /// Default filter level when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_dir() -> String {
    "~/.browserpilot/logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}
