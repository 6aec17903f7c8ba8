//! patchvm configuration system
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Explicit config file (--config)
//! 3. User-level (~/.config/patchvm/config.toml)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use patchvm::util::config::VmConfig;
//!
//! let config: VmConfig = toml::from_str("[scheduler]\nmax_clones = 10\n").unwrap();
//! assert_eq!(config.scheduler.max_clones, 10);
//! assert_eq!(config.scheduler.tick_rate_hz, 60);
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runtime::scheduler::SchedulerConfig;
use crate::util::logger::LogLevel;
use crate::worker::WorkerMode;

/// Runtime configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct VmConfig {
    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// Worker settings
    #[serde(default)]
    pub worker: WorkerSection,
    /// Log settings
    #[serde(default)]
    pub log: LogSection,
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SchedulerSection {
    /// Clone ceiling
    #[serde(default = "default_max_clones")]
    pub max_clones: usize,
    /// Ticks per second
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
    /// Deadline for host requests, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Deadline for a block call on the backend; 0 disables it
    #[serde(default)]
    pub block_timeout_ms: u64,
    /// End threads whose script faulted
    #[serde(default = "default_true")]
    pub end_faulted_threads: bool,
}

fn default_max_clones() -> usize {
    crate::runtime::stage::MAX_CLONES
}

fn default_tick_rate() -> u32 {
    60
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_clones: default_max_clones(),
            tick_rate_hz: default_tick_rate(),
            request_timeout_ms: default_request_timeout(),
            block_timeout_ms: 0,
            end_faulted_threads: true,
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct WorkerSection {
    /// Where the script backend runs
    #[serde(default)]
    pub mode: WorkerMode,
    /// Backend location passed on init
    #[serde(default)]
    pub backend_url: String,
}

/// Log configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct LogSection {
    #[serde(default)]
    pub level: LogLevel,
}

impl VmConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: VmConfig = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("scheduler.tick_rate_hz must be positive".into()));
        }
        if self.scheduler.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.request_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.scheduler.tick_rate_hz.max(1)))
    }
}

impl From<&VmConfig> for SchedulerConfig {
    fn from(config: &VmConfig) -> Self {
        let section = &config.scheduler;
        Self {
            max_clones: section.max_clones,
            tick_interval: config.tick_interval(),
            request_timeout: Duration::from_millis(section.request_timeout_ms),
            block_timeout: (section.block_timeout_ms > 0)
                .then(|| Duration::from_millis(section.block_timeout_ms)),
            end_faulted_threads: section.end_faulted_threads,
            ..SchedulerConfig::default()
        }
    }
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    // Try XDG config directory on Unix
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("patchvm"));
    }

    // Fallback to ~/.config/patchvm
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("patchvm"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("patchvm"));
    }

    None
}

/// Get the user config file path (~/.config/patchvm/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load a config file. A missing file is an error.
pub fn load_config_file(path: &Path) -> Result<VmConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    VmConfig::from_toml(&content)
}

/// Load configuration
///
/// An explicit path must exist; otherwise the user-level file is used when
/// present, and defaults when it is not.
pub fn load_config(explicit: Option<&Path>) -> Result<VmConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }
    match get_config_path() {
        Some(path) if path.exists() => load_config_file(&path),
        _ => Ok(VmConfig::default()),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config parse error: {0}")]
    ParseError(toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
