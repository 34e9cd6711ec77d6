//! Workbench CLI
//!
//! Command-line front end for validating, running and reviewing model jobs.

mod commands;
mod config;
mod id_resolver;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "workbench")]
#[command(about = "Launch, observe and remember model runs", long_about = None)]
struct Cli {
    /// Spec & Validation Provider URL
    #[arg(
        long,
        env = "WORKBENCH_PROVIDER_URL",
        default_value = "http://localhost:56789/api"
    )]
    provider_url: String,

    /// Model executable (overrides INVEST_EXE)
    #[arg(long)]
    invest_exe: Option<PathBuf>,

    /// Job history file (overrides WORKBENCH_HISTORY_FILE)
    #[arg(long)]
    history_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so that model output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workbench=info,workbench_runner=info,workbench_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::load(cli.provider_url, cli.invest_exe, cli.history_file)?;

    handle_command(cli.command, &config).await
}
