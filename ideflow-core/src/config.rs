//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/ideflow/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/ideflow/` (~/.config/ideflow/)
//! - Data: `$XDG_DATA_HOME/ideflow/` (~/.local/share/ideflow/)
//! - State/Logs: `$XDG_STATE_HOME/ideflow/` (~/.local/state/ideflow/)

use crate::error::{Error, Result};
use chrono::TimeDelta;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Batch run settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Cleanup heuristics
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Interval transformers
    #[serde(default)]
    pub intervals: IntervalsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for one batch run over an archive root
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Glob (relative to the archive root) used to discover archives
    #[serde(default = "default_archive_pattern")]
    pub archive_pattern: String,

    /// Worker threads for extraction and group processing (0 = one per CPU)
    #[serde(default)]
    pub workers: usize,

    /// Keep events without `triggered_at` aside instead of dropping them
    #[serde(default)]
    pub retain_untimed: bool,

    /// Use the persisted identifier cache
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive_pattern: default_archive_pattern(),
            workers: 0,
            retain_untimed: false,
            cache_enabled: true,
        }
    }
}

fn default_archive_pattern() -> String {
    "**/*.jsonl".to_string()
}

fn default_true() -> bool {
    true
}

/// Cleanup heuristic configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CleanupConfig {
    /// Two command events at most this far apart are concurrent
    #[serde(default = "default_concurrent_threshold_ms")]
    pub concurrent_threshold_ms: u64,

    /// Low-level text navigation commands that never justify a merge on their own
    #[serde(default = "default_ignorable_commands")]
    pub ignorable_commands: Vec<String>,

    /// Event kinds removed as administrative noise
    #[serde(default = "default_dropped_kinds")]
    pub dropped_kinds: Vec<String>,

    /// Command ids removed as noise
    #[serde(default)]
    pub dropped_commands: Vec<String>,

    /// Remove commands whose id has no name part (ends with ':')
    #[serde(default = "default_true")]
    pub drop_nameless_commands: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            concurrent_threshold_ms: default_concurrent_threshold_ms(),
            ignorable_commands: default_ignorable_commands(),
            dropped_kinds: default_dropped_kinds(),
            dropped_commands: vec![],
            drop_nameless_commands: true,
        }
    }
}

impl CleanupConfig {
    /// Concurrency threshold as a time delta.
    ///
    /// Saturates at `TimeDelta::MAX`; `Config::validate` rejects such values.
    pub fn concurrent_threshold(&self) -> TimeDelta {
        millis(self.concurrent_threshold_ms).unwrap_or(TimeDelta::MAX)
    }
}

fn default_concurrent_threshold_ms() -> u64 {
    100
}

fn default_ignorable_commands() -> Vec<String> {
    [
        "TextControl.Backspace",
        "TextControl.Delete",
        "TextControl.Enter",
        "TextControl.Tab",
        "TextControl.Left",
        "TextControl.Right",
        "TextControl.Up",
        "TextControl.Down",
        "TextControl.Home",
        "TextControl.End",
        "TextControl.PageUp",
        "TextControl.PageDown",
        "TextControl.Left.Selection",
        "TextControl.Right.Selection",
        "TextControl.Up.Selection",
        "TextControl.Down.Selection",
        "TextControl.Home.Selection",
        "TextControl.End.Selection",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_dropped_kinds() -> Vec<String> {
    vec!["info".to_string(), "error".to_string()]
}

/// Interval transformer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct IntervalsConfig {
    /// Gap (minutes) after which user activity is considered interrupted
    #[serde(default = "default_inactivity_minutes")]
    pub inactivity_minutes: u32,

    /// Seconds of silence after which a file interaction ends
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,

    /// Command id prefixes that denote a unit test run
    #[serde(default = "default_test_run_commands")]
    pub test_run_commands: Vec<String>,

    /// Transformers that should not be instantiated
    #[serde(default)]
    pub disabled_transformers: Vec<String>,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            inactivity_minutes: default_inactivity_minutes(),
            file_timeout_secs: default_file_timeout_secs(),
            test_run_commands: default_test_run_commands(),
            disabled_transformers: vec![],
        }
    }
}

impl IntervalsConfig {
    /// Inactivity threshold as a time delta.
    pub fn inactivity(&self) -> TimeDelta {
        TimeDelta::minutes(self.inactivity_minutes as i64)
    }

    /// File interaction timeout as a time delta.
    ///
    /// Saturates at `TimeDelta::MAX`; `Config::validate` rejects such values.
    pub fn file_timeout(&self) -> TimeDelta {
        secs(self.file_timeout_secs).unwrap_or(TimeDelta::MAX)
    }

    /// Whether the named transformer is enabled.
    ///
    /// `disabled_transformers` entries match either the full name
    /// (`core.file_interaction`) or the name without the `core.` prefix.
    pub fn is_enabled(&self, name: &str) -> bool {
        let short = name.strip_prefix("core.");
        !self
            .disabled_transformers
            .iter()
            .any(|d| d == name || short == Some(d.as_str()))
    }
}

fn millis(ms: u64) -> Option<TimeDelta> {
    i64::try_from(ms).ok().and_then(TimeDelta::try_milliseconds)
}

fn secs(secs: u64) -> Option<TimeDelta> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

fn default_inactivity_minutes() -> u32 {
    16
}

fn default_file_timeout_secs() -> u64 {
    16
}

fn default_test_run_commands() -> Vec<String> {
    [
        "UnitTest.RunContext",
        "UnitTest.RunCurrentSession",
        "UnitTest.RunSolution",
        "UnitTestSession.RunAll",
        "TestExplorer.RunAllTests",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.archive_pattern.trim().is_empty() {
            return Err(Error::Config(
                "pipeline.archive_pattern must not be empty".to_string(),
            ));
        }
        if self.intervals.inactivity_minutes == 0 {
            return Err(Error::Config(
                "intervals.inactivity_minutes must be at least 1".to_string(),
            ));
        }
        if millis(self.cleanup.concurrent_threshold_ms).is_none() {
            return Err(Error::Config(format!(
                "cleanup.concurrent_threshold_ms out of range: {}",
                self.cleanup.concurrent_threshold_ms
            )));
        }
        if secs(self.intervals.file_timeout_secs).is_none() {
            return Err(Error::Config(format!(
                "intervals.file_timeout_secs out of range: {}",
                self.intervals.file_timeout_secs
            )));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/ideflow/config.toml` (~/.config/ideflow/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("ideflow").join("config.toml")
    }

    /// Returns the data directory path (for the identifier cache)
    ///
    /// `$XDG_DATA_HOME/ideflow/` (~/.local/share/ideflow/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("ideflow")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/ideflow/` (~/.local/state/ideflow/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("ideflow")
    }

    /// Returns the identifier cache database path
    ///
    /// `$XDG_DATA_HOME/ideflow/identifier-cache.db`
    pub fn cache_path() -> PathBuf {
        Self::data_dir().join("identifier-cache.db")
    }

    /// Returns the log file path for one binary
    ///
    /// `$XDG_STATE_HOME/ideflow/<component>.log` (~/.local/state/ideflow/ideflow-process.log)
    pub fn log_path(component: &str) -> PathBuf {
        Self::state_dir().join(format!("{component}.log"))
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
