//! History command handlers
//!
//! Lists, shows and clears the recent-jobs history.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use workbench_runner::{HistoryEntry, JobStore};

use super::colorize_status;
use crate::config::Config;
use crate::id_resolver::{resolve_history_entry, short_hash};

/// History subcommands
#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List recent jobs, most recent first
    List,
    /// Show one job in detail
    Show {
        /// Workspace hash or unambiguous prefix
        hash: String,
    },
    /// Discard all history
    Clear,
}

/// Handle history commands
///
/// # Arguments
/// * `command` - The history command to execute
/// * `config` - The CLI configuration
pub async fn handle_history_command(command: HistoryCommands, config: &Config) -> Result<()> {
    let store = JobStore::open(&config.runner.history_path, config.runner.history_capacity);

    match command {
        HistoryCommands::List => list_history(&store).await,
        HistoryCommands::Show { hash } => show_job(&store, &hash).await,
        HistoryCommands::Clear => clear_history(&store).await,
    }
}

async fn list_history(store: &JobStore) -> Result<()> {
    let report = store
        .load_report()
        .await
        .context("Failed to read job history")?;

    if report.skipped > 0 {
        println!(
            "{}",
            format!("Skipped {} unreadable history entry(ies).", report.skipped).yellow()
        );
    }

    if report.entries.is_empty() {
        println!("{}", "No recent jobs.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} recent job(s):", report.entries.len()).bold());
    println!();
    for entry in &report.entries {
        print_job_summary(entry);
    }

    Ok(())
}

async fn show_job(store: &JobStore, hash: &str) -> Result<()> {
    let report = store
        .load_report()
        .await
        .context("Failed to read job history")?;
    let entry = resolve_history_entry(&report.entries, hash)?;

    print_job_details(entry);
    Ok(())
}

async fn clear_history(store: &JobStore) -> Result<()> {
    store.clear().await.context("Failed to clear job history")?;
    println!("{}", "✓ History cleared".green());
    Ok(())
}

/// Print a one-entry summary
fn print_job_summary(entry: &HistoryEntry) {
    let job = &entry.job;

    println!(
        "  {} {} {}",
        "▸".cyan(),
        job.display_name(),
        short_hash(entry.workspace_hash.as_str()).dimmed()
    );
    if let Some(dir) = &job.workspace.directory {
        println!("    Workspace: {}", dir.display());
    }
    if let Some(suffix) = &job.workspace.suffix {
        println!("    Suffix:    {}", suffix);
    }
    println!("    Status:    {}", colorize_status(&job.status));
    if let Some(time) = &job.human_time {
        println!("    Saved:     {}", time.dimmed());
    }
    println!();
}

/// Print detailed job information
fn print_job_details(entry: &HistoryEntry) {
    let job = &entry.job;

    println!("{}", "Job Details:".bold());
    println!("  Hash:      {}", entry.workspace_hash.as_str().cyan());
    println!("  Model:     {} ({})", job.display_name(), job.model_run_name.dimmed());
    println!("  Status:    {}", colorize_status(&job.status));
    if let Some(dir) = &job.workspace.directory {
        println!("  Workspace: {}", dir.display());
    }
    if let Some(suffix) = &job.workspace.suffix {
        println!("  Suffix:    {}", suffix);
    }
    if let Some(logfile) = &job.logfile {
        println!("  Log file:  {}", logfile.display());
    }
    if let Some(time) = &job.human_time {
        println!("  Saved:     {}", time);
    }
    if let Some(description) = &job.description {
        println!("  Notes:     {}", description);
    }

    if !job.args_values.is_empty() {
        println!("\n{}", "Arguments:".bold());
        match serde_json::to_string_pretty(&job.args_values) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => {
                for (key, value) in &job.args_values {
                    println!("  {} = {}", key.cyan(), value);
                }
            }
        }
    }
}
