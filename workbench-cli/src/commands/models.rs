//! Model listing command

use anyhow::{Context, Result};
use colored::*;
use workbench_client::{ProviderClient, SpecProvider};

use crate::config::Config;

/// List all models offered by the provider
pub async fn list_models(config: &Config) -> Result<()> {
    let client = ProviderClient::new(&config.provider_url);
    let models = client
        .list_models()
        .await
        .context("Failed to fetch the model list")?;

    if models.is_empty() {
        println!("{}", "No models found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} model(s):", models.len()).bold());
    println!();
    for (name, info) in &models {
        println!("  {} {}", "▸".cyan(), name);
        println!("    Run name: {}", info.internal_name.dimmed());
        if !info.aliases.is_empty() {
            println!("    Aliases:  {}", info.aliases.join(", ").dimmed());
        }
    }

    Ok(())
}
