//! AgentWatch CLI entry point.

use agentwatch_core::env::{get_var, vars};
use agentwatch_core::Config;
use clap::Parser;
use agentwatch_cli::{load_config, run, Cli};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.json_logs);

    // Run the command
    run(cli, config).await
}

/// Log to stderr; stdout carries command output.
fn init_logging(config: &Config, json_flag: bool) {
    let filter = get_var(vars::AGENTWATCH_LOG)
        .or_else(|| get_var("RUST_LOG"))
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| {
            EnvFilter::new(format!("agentwatch={}", config.logging.level.as_str()))
        });

    let json = json_flag || config.logging.json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}
