//! Configuration management commands.

use agentwatch_core::config::Config;
use agentwatch_core::paths;
use clap::Args;
use std::path::Path;

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub fn run(args: ConfigArgs, config: &Config, explicit: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }

        ConfigCommand::Validate => match config.validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => anyhow::bail!("Configuration error: {}", e),
        },

        ConfigCommand::Path => {
            let path = match explicit {
                Some(path) => path.to_path_buf(),
                None => paths::config_file()?,
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}
