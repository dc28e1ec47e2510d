//! vaultsync CLI - Command-line interface for vaultsync
//!
//! Provides commands for:
//! - Running a synchronization (or a dry run)
//! - Inspecting generated sync plans
//! - Viewing and editing configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{config::ConfigCommand, plan::PlanCommand, sync::SyncCommand};
use output::{GlobalOptions, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "vaultsync",
    version,
    about = "Three-way file synchronization with end-to-end encryption"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synchronize the local and remote replicas
    Sync(SyncCommand),
    /// Show the latest sync plan or the plan history
    Plan(PlanCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let options = GlobalOptions {
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        quiet: cli.quiet,
        config_path: cli.config.map(std::path::PathBuf::from),
    };

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(&options).await,
        Commands::Plan(cmd) => cmd.execute(&options).await,
        Commands::Config(cmd) => cmd.execute(&options).await,
    }
}
