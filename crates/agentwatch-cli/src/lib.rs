//! AgentWatch command-line interface.

pub mod commands;

use agentwatch_core::Config;
use clap::{Parser, Subcommand};
use std::path::Path;

/// AgentWatch - sandboxed agent sessions with event telemetry
#[derive(Parser)]
#[command(name = "agentwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, env = "AGENTWATCH_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a command in a fresh workspace and report its session summary
    Run(commands::run::RunArgs),

    /// Parse a recorded event stream
    Parse(commands::parse::ParseArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Load the config named on the command line, or the default one.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    Ok(config)
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => commands::run::run(args, &config).await,
        Commands::Parse(args) => commands::parse::run(args).await,
        Commands::Config(args) => commands::config::run(args, &config, cli.config.as_deref()),
        Commands::Version => {
            println!("agentwatch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
