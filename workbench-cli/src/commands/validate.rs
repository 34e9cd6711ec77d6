//! Validation command
//!
//! Loads a datastack, asks the provider to validate it and shows the result
//! per argument along with the run gate.

use anyhow::{Context, Result, bail};
use colored::*;
use std::path::Path;
use workbench_client::{ProviderClient, SpecProvider};
use workbench_core::datastack::{self, LoadedDatastack};
use workbench_core::domain::job::JobRecord;
use workbench_core::validation::{self, ValidationState};

use crate::config::Config;

/// Handle `workbench validate`
pub async fn handle_validate_command(path: &Path, config: &Config) -> Result<()> {
    let (job, _) = load_job(path)?;
    let client = ProviderClient::new(&config.provider_url);

    let state = validate_job(&client, &job).await?;
    print_validation(&state);

    if !state.ready_to_run() {
        bail!("{} argument(s) failed validation", state.invalid_keys().len());
    }
    Ok(())
}

/// Reads a datastack file and opens it as an unrun job
pub(crate) fn load_job(path: &Path) -> Result<(JobRecord, LoadedDatastack)> {
    let loaded = datastack::read_from_path(path)
        .with_context(|| format!("Failed to load datastack {}", path.display()))?;
    let job = JobRecord::from_datastack(loaded.clone());
    Ok((job, loaded))
}

/// Validates a job's current arguments against its model's spec
pub(crate) async fn validate_job(provider: &dyn SpecProvider, job: &JobRecord) -> Result<ValidationState> {
    let spec = match provider.get_spec(&job.model_run_name).await {
        Ok(spec) => spec,
        Err(e) if e.is_unknown_model() => {
            bail!("The provider has no model named {}", job.model_run_name)
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to fetch the spec for {}", job.model_run_name));
        }
    };

    let issues = provider
        .validate(&spec.module, &job.args_values)
        .await
        .context("Failed to validate arguments")?;

    Ok(validation::aggregate(&job.args_values, &issues))
}

/// Print per-argument validation state
pub(crate) fn print_validation(state: &ValidationState) {
    println!("{}", "Arguments:".bold());
    for (key, arg) in state.iter() {
        let value = arg
            .value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        if arg.valid {
            println!("  {} {} = {}", "✓".green(), key.cyan(), value);
        } else {
            println!("  {} {} = {}", "✗".red(), key.cyan(), value);
            if let Some(message) = &arg.message {
                for line in message.lines() {
                    println!("      {}", line.red());
                }
            }
        }
    }
    println!();

    if state.ready_to_run() {
        println!("{}", "Ready to run".green().bold());
    } else {
        println!("{}", "Not ready to run".red().bold());
    }
}
