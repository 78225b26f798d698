//! syncroot CLI - Command-line interface for the adapter synchronization core
//!
//! Provides commands for:
//! - Moving file content through the revision transfer engine
//! - Building and printing the adapter tree of a local folder
//! - Setting up and removing synchronized roots
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use syncroot_core::config::{Config, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, root::RootCommand,
    transfer::TransferCommand, tree::TreeCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "syncroot", version, about = "Adapter synchronization core tools")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Copy a file through the transfer engine
    Transfer(TransferCommand),
    /// Print the adapter tree of a local folder
    Tree(TreeCommand),
    /// Manage synchronized roots
    #[command(subcommand)]
    Root(RootCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Log level used when `RUST_LOG` is not set
fn default_filter(verbose: u8, quiet: bool, logging: &LoggingConfig) -> String {
    match (quiet, verbose) {
        (true, _) => "error".to_string(),
        (false, 0) => logging.level.clone(),
        (false, 1) => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(cli: &Cli, logging: &LoggingConfig) {
    let filter = default_filter(cli.verbose, cli.quiet, logging);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // logs go to stderr so JSON command output stays parseable
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);
    init_tracing(&cli, &config.logging);

    let format = OutputFormat::from_flags(cli.json, cli.quiet);

    match &cli.command {
        Commands::Transfer(cmd) => cmd.execute(format, &config).await,
        Commands::Tree(cmd) => cmd.execute(format).await,
        Commands::Root(cmd) => cmd.execute(format, &config).await,
        Commands::Config(cmd) => cmd.execute(format, &config_path),
        Commands::Completions(cmd) => cmd.execute(),
    }
}
