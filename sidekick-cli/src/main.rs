//! Sidekick CLI - supervise local sidecar services from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod manifest;

#[derive(Parser)]
#[command(name = "sidekick")]
#[command(about = "Supervise authenticated sidecar services", version = sidekick::VERSION)]
struct Cli {
    /// Also write logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a service definition file and list its services.
    Check {
        /// Path to the definition file.
        #[arg(long)]
        definition: PathBuf,
    },
    /// Start the services of a manifest and run until interrupted.
    Run {
        /// Path to the manifest file.
        #[arg(long)]
        manifest: PathBuf,
        /// Seconds between status reports.
        #[arg(long, default_value = "10")]
        status_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = sidekick::logging::init("info", cli.log_file.as_deref())?;

    match cli.command {
        Command::Check { definition } => commands::check::execute(&definition),
        Command::Run {
            manifest,
            status_interval,
        } => commands::run::execute(&manifest, status_interval).await,
    }
}
