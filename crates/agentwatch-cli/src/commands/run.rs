//! Run a command in a fresh workspace with telemetry attached.

use agentwatch_core::config::Config;
use agentwatch_core::types::SessionSummary;
use agentwatch_core::{id, Backend};
use agentwatch_sandbox::{provider_for, Workspace, WorkspaceConfig, WorkspaceProvider};
use agentwatch_telemetry::{HookClient, SessionOutputStream, TelemetryError};
use clap::Args;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Run command arguments.
#[derive(Args)]
pub struct RunArgs {
    /// Workspace backend (overrides config)
    #[arg(short, long)]
    pub backend: Option<Backend>,

    /// Container image (overrides config)
    #[arg(long)]
    pub image: Option<String>,

    /// Session id (generated when omitted)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Echo raw output lines to stderr
    #[arg(long)]
    pub echo: bool,

    /// Command to run, joined with spaces and passed to `/bin/sh -c`
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

/// Run the command.
pub async fn run(args: RunArgs, config: &Config) -> anyhow::Result<()> {
    let mut settings = config.workspace.clone();
    if let Some(backend) = args.backend {
        settings.backend = backend;
    }
    if let Some(image) = &args.image {
        settings.image = Some(image.clone());
    }

    let workspace_config = WorkspaceConfig::from_settings(&settings);
    workspace_config.validate()?;

    let provider = provider_for(settings.backend, config)?;
    let client = Arc::new(HookClient::from_settings(&config.telemetry)?);
    let session_id = args.session.clone().unwrap_or_else(id::uuid);
    let command = args.command.join(" ");

    let workspace = provider.create(workspace_config).await?;
    info!(
        workspace = workspace.id(),
        backend = %settings.backend,
        session = %session_id,
        "Workspace ready"
    );

    client.start().await;
    let outcome = observe(
        provider.as_ref(),
        &workspace,
        &client,
        &session_id,
        &command,
        args.echo,
    )
    .await;
    client.stop().await;

    let stats = client.stats().await;
    info!(
        delivered = stats.delivered,
        discarded = stats.discarded,
        evicted = stats.evicted,
        "Telemetry delivery finished"
    );

    provider.destroy(workspace).await;

    let summary = outcome?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn observe(
    provider: &dyn WorkspaceProvider,
    workspace: &Workspace,
    client: &Arc<HookClient>,
    session_id: &str,
    command: &str,
    echo: bool,
) -> anyhow::Result<SessionSummary> {
    client
        .emit_session_start(
            session_id,
            json!({ "workspace_id": workspace.id(), "command": command }),
        )
        .await;

    let lines = provider.stream(workspace, command);
    let mut output =
        SessionOutputStream::new(session_id, lines).with_client(Arc::clone(client));

    {
        let mut raw = output.raw();
        while let Some(line) = raw.next().await {
            if echo {
                eprintln!("{}", line);
            }
        }
    }

    let summary = match output.get_summary() {
        Ok(summary) => summary.clone(),
        Err(TelemetryError::NotYetConsumed) => {
            warn!(session = %session_id, "Command produced no output");
            SessionSummary::new(session_id)
        }
        Err(e) => return Err(e.into()),
    };

    client
        .emit_session_end(session_id, serde_json::to_value(&summary)?)
        .await;
    Ok(summary)
}
