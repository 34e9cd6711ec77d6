//! Configuration module
//!
//! Combines the runner configuration from the environment with the
//! provider URL and any explicit command-line overrides.

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the Spec & Validation Provider
    pub provider_url: String,

    /// Settings for launching models and keeping history
    pub runner: workbench_runner::Config,
}

impl Config {
    /// Loads the runner configuration, falling back to defaults
    ///
    /// # Arguments
    /// * `provider_url` - Base URL of the Spec & Validation Provider
    /// * `invest_exe` - Explicit model executable, if given
    /// * `history_file` - Explicit history file, if given
    pub fn load(
        provider_url: String,
        invest_exe: Option<PathBuf>,
        history_file: Option<PathBuf>,
    ) -> Result<Self> {
        let mut runner = match workbench_runner::Config::from_env() {
            Ok(config) => config,
            Err(e) => {
                info!("{}; using default runner configuration", e);
                workbench_runner::Config::default()
            }
        };

        if let Some(exe) = invest_exe {
            runner.invest_exe = exe;
        }
        if let Some(path) = history_file {
            runner.history_path = path;
        }
        runner.validate()?;

        Ok(Self {
            provider_url,
            runner,
        })
    }
}
