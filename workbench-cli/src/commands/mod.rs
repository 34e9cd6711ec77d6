//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod history;
mod models;
mod run;
mod validate;

pub use history::HistoryCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use std::path::PathBuf;
use workbench_core::domain::job::JobStatus;
use workbench_core::domain::settings::LoggingLevel;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List the models the provider knows about
    Models,
    /// Validate the arguments in a datastack file
    Validate {
        /// Path to a datastack JSON file
        datastack: PathBuf,
    },
    /// Validate and run the model described by a datastack file
    Run {
        /// Path to a datastack JSON file
        datastack: PathBuf,

        /// Model log verbosity (DEBUG, INFO, WARNING, ERROR)
        #[arg(long)]
        logging_level: Option<LoggingLevel>,

        /// Write outputs here instead of the datastack's workspace_dir
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
    /// Recent jobs
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Models => models::list_models(config).await,
        Commands::Validate { datastack } => validate::handle_validate_command(&datastack, config).await,
        Commands::Run {
            datastack,
            logging_level,
            workspace,
        } => run::handle_run_command(&datastack, logging_level, workspace, config).await,
        Commands::History { command } => history::handle_history_command(command, config).await,
    }
}

/// Colorize job status for display
fn colorize_status(status: &JobStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Unrun => status_str.dimmed(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Success => status_str.green(),
        JobStatus::Error => status_str.red(),
    }
}
