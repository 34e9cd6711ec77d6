//! Run command
//!
//! Validates a datastack, launches the model and follows it to the end,
//! echoing its output. Ctrl-C cancels the run; the job is saved to history
//! either way.

use anyhow::{Context, Result, bail};
use colored::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;
use workbench_client::ProviderClient;
use workbench_core::domain::args::{ArgValue, WORKSPACE_DIR_KEY};
use workbench_core::domain::job::JobStatus;
use workbench_core::domain::settings::LoggingLevel;
use workbench_runner::{JobEvent, JobStore, ProcessSupervisor, SupervisorError};

use super::colorize_status;
use super::validate::{load_job, print_validation, validate_job};
use crate::config::Config;

/// Handle `workbench run`
///
/// # Arguments
/// * `path` - The datastack to run
/// * `logging_level` - Overrides the configured model verbosity
/// * `workspace` - Overrides the datastack's workspace directory
/// * `config` - The CLI configuration
pub async fn handle_run_command(
    path: &Path,
    logging_level: Option<LoggingLevel>,
    workspace: Option<PathBuf>,
    config: &Config,
) -> Result<()> {
    let (mut job, loaded) = load_job(path)?;
    if let Some(dir) = workspace {
        job.set_arg(
            WORKSPACE_DIR_KEY,
            ArgValue::String(dir.to_string_lossy().into_owned()),
        );
    }

    let client = ProviderClient::new(&config.provider_url);
    let validation = validate_job(&client, &job).await?;
    if !validation.ready_to_run() {
        print_validation(&validation);
        bail!("Not running {}: arguments failed validation", job.display_name());
    }

    let mut runner = config.runner.clone().with_invest_version(loaded.invest_version);
    if let Some(level) = logging_level {
        runner = runner.with_logging_level(level);
    }
    let store = JobStore::open(&runner.history_path, runner.history_capacity);
    let supervisor = ProcessSupervisor::new(runner).with_store(store);

    job.assign_nav_id();
    let mut handle = match supervisor.start(&mut job, &validation).await {
        Ok(handle) => handle,
        Err(e @ SupervisorError::Spawn { .. }) => {
            println!("{} {}", "Status:".bold(), colorize_status(&job.status));
            return Err(e).context("Could not start the model");
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "{} {} in {}",
        "Running".cyan().bold(),
        job.display_name(),
        job.workspace
            .directory
            .as_deref()
            .map(|d| d.display().to_string())
            .unwrap_or_default()
    );

    let canceller = handle.canceller();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => print_event(event),
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                eprintln!("{}", "Canceling run...".yellow());
                if let Err(e) = canceller.terminate().await {
                    warn!("Failed to cancel run: {}", e);
                }
            }
        }
    }

    let diagnostics = handle.diagnostics();
    let finished = handle.wait().await;

    println!();
    println!("{} {}", "Status:".bold(), colorize_status(&finished.status));
    if let Some(logfile) = &finished.logfile {
        println!("{} {}", "Log file:".bold(), logfile.display());
    }

    if finished.status == JobStatus::Error {
        if !diagnostics.trim().is_empty() {
            println!("\n{}", "Diagnostics:".bold());
            println!("{}", diagnostics.trim_end().red());
        }
        bail!("{} finished with status error", finished.display_name());
    }

    Ok(())
}

fn print_event(event: JobEvent) {
    match event {
        JobEvent::StatusChanged(status) => {
            println!("{} {}", "Status:".bold(), colorize_status(&status));
        }
        JobEvent::Stdout(text) => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        JobEvent::Stderr(text) => {
            eprint!("{}", text.dimmed());
        }
        JobEvent::LogfileDiscovered(path) => {
            println!("{} {}", "Log file:".bold(), path.display());
        }
        JobEvent::LogfileUnavailable => {
            println!("{}", "Log file not found; showing process output only".yellow());
        }
        JobEvent::Finished { exit_code, .. } => {
            if let Some(code) = exit_code {
                println!("{} {}", "Exit code:".bold(), code);
            }
        }
    }
}
