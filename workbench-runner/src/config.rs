//! Runner configuration
//!
//! Defines all configurable parameters for launching models and keeping
//! their history: the model executable, scratch and history locations, the
//! settings passed through to every run, and log discovery timing.

use std::path::PathBuf;
use std::time::Duration;
use workbench_core::domain::settings::{InvestSettings, LoggingLevel};

const DEFAULT_HISTORY_CAPACITY: usize = 20;
const DEFAULT_INVEST_VERSION: &str = "UNKNOWN";

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path (or bare name on PATH) of the model executable
    pub invest_exe: PathBuf,

    /// Version stamp written into every generated datastack
    pub invest_version: String,

    /// Parent of the per-run scratch directories
    pub temp_dir: PathBuf,

    /// Settings passed through to every run
    pub settings: InvestSettings,

    /// The durable job history file
    pub history_path: PathBuf,

    /// Maximum number of jobs kept in history
    pub history_capacity: usize,

    /// How long to look for the model's log file after its first output
    pub logfile_timeout: Duration,

    /// How often the workspace is rescanned while looking for the log file
    pub logfile_poll_interval: Duration,

    /// How long to keep reading buffered output after the process exits
    pub output_drain_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(invest_exe: impl Into<PathBuf>) -> Self {
        let temp_dir = std::env::temp_dir().join("workbench");
        let history_path = default_history_path().unwrap_or_else(|| temp_dir.join("recent_jobs.json"));

        Self {
            invest_exe: invest_exe.into(),
            invest_version: DEFAULT_INVEST_VERSION.to_string(),
            temp_dir,
            settings: InvestSettings::default(),
            history_path,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            logfile_timeout: Duration::from_millis(5000),
            logfile_poll_interval: Duration::from_millis(250),
            output_drain_timeout: Duration::from_millis(2000),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - INVEST_EXE (required)
    /// - INVEST_VERSION (optional, default: UNKNOWN)
    /// - WORKBENCH_TEMP_DIR (optional, default: <system temp>/workbench)
    /// - WORKBENCH_LOGGING_LEVEL (optional, default: INFO)
    /// - WORKBENCH_N_WORKERS (optional, default: -1)
    /// - WORKBENCH_HISTORY_FILE (optional, default: ~/.workbench/recent_jobs.json)
    /// - WORKBENCH_HISTORY_CAPACITY (optional, default: 20)
    /// - WORKBENCH_LOGFILE_TIMEOUT_MS (optional, milliseconds, default: 5000)
    pub fn from_env() -> anyhow::Result<Self> {
        let invest_exe = std::env::var("INVEST_EXE")
            .map_err(|_| anyhow::anyhow!("INVEST_EXE environment variable not set"))?;

        let mut config = Self::new(invest_exe);

        if let Ok(version) = std::env::var("INVEST_VERSION") {
            config.invest_version = version;
        }

        if let Ok(dir) = std::env::var("WORKBENCH_TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }

        if let Some(level) = std::env::var("WORKBENCH_LOGGING_LEVEL")
            .ok()
            .and_then(|s| s.parse::<LoggingLevel>().ok())
        {
            config.settings.logging_level = level;
        }

        if let Ok(n_workers) = std::env::var("WORKBENCH_N_WORKERS") {
            config.settings.n_workers = n_workers;
        }

        if let Ok(path) = std::env::var("WORKBENCH_HISTORY_FILE") {
            config.history_path = PathBuf::from(path);
        }

        config.history_capacity = std::env::var("WORKBENCH_HISTORY_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_HISTORY_CAPACITY);

        if let Some(timeout) = std::env::var("WORKBENCH_LOGFILE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.logfile_timeout = Duration::from_millis(timeout);
        }

        Ok(config)
    }

    pub fn with_logging_level(mut self, level: LoggingLevel) -> Self {
        self.settings.logging_level = level;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = path.into();
        self
    }

    pub fn with_invest_version(mut self, version: impl Into<String>) -> Self {
        self.invest_version = version.into();
        self
    }

    /// Overrides log discovery and output drain timing
    pub fn with_timing(mut self, logfile_timeout: Duration, poll_interval: Duration, drain: Duration) -> Self {
        self.logfile_timeout = logfile_timeout;
        self.logfile_poll_interval = poll_interval;
        self.output_drain_timeout = drain;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.invest_exe.as_os_str().is_empty() {
            anyhow::bail!("invest_exe cannot be empty");
        }

        if self.history_capacity == 0 {
            anyhow::bail!("history_capacity must be greater than 0");
        }

        if self.logfile_timeout.is_zero() {
            anyhow::bail!("logfile_timeout must be greater than 0");
        }

        if self.logfile_poll_interval > self.logfile_timeout {
            anyhow::bail!("logfile_poll_interval cannot exceed logfile_timeout");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("invest")
    }
}

fn default_history_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
    Some(PathBuf::from(home).join(".workbench").join("recent_jobs.json"))
}
