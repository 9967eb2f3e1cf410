//! Filetrail - per-file snapshot history.
//!
//! This is the main entry point for the filetrail CLI.

mod commands;

use clap::{Parser, Subcommand};
use commands::{ConfigCommand, FilterArgs, HistoryCommand};
use filetrail_core::Config;
use filetrail_snapshot::HistoryEngine;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "filetrail")]
#[command(author, version, about = "Keep a history of every save of a file", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory to read the project config from (defaults to the current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    History(HistoryCommand),
    /// Hide snapshots by their content
    Filter(FilterArgs),
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommand>,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let project_dir = match cli.project {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let (config, sources) = Config::load(Some(&project_dir)).await?;
    commands::init_logging(cli.verbose, &config);
    tracing::debug!(project = %project_dir.display(), sources = ?sources, "Starting");

    let engine = HistoryEngine::new(config.directory_mode()?);
    let policy = config.retention_policy();

    let result = match cli.command {
        Commands::History(command) => commands::handle_history(&engine, &policy, command).await,
        Commands::Filter(args) => commands::handle_filter(&engine, args).await,
        Commands::Config { command } => {
            commands::handle_config(&config, &sources, &project_dir, command).await
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

/// Print version information.
fn print_version() {
    println!("filetrail {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Keeps a timestamped history of every save of a file.");
}
