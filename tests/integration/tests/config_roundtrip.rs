//! Config save/load roundtrip and CLI wiring.

use agentwatch_cli::{load_config, Cli, Commands};
use agentwatch_core::config::{Config, SinkSettings};
use agentwatch_core::Backend;
use agentwatch_sandbox::{provider_for, WorkspaceConfig};
use agentwatch_telemetry::HookClient;
use clap::Parser;
use tempfile::TempDir;

fn parse_cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agentwatch.json5");

    let mut config = Config::default();
    config.telemetry.batch_size = 7;
    config.workspace.backend = Backend::Container;
    config.workspace.image = Some("alpine:3.19".to_string());
    config.save(&path).unwrap();

    let loaded = load_config(Some(&path)).unwrap();
    assert_eq!(loaded.telemetry.batch_size, 7);
    assert_eq!(loaded.workspace.backend, Backend::Container);
    assert_eq!(loaded.workspace.image.as_deref(), Some("alpine:3.19"));
    loaded.validate().unwrap();
}

#[test]
fn test_json5_file_drives_components() {
    let config = Config::parse(
        r#"{
            // comments and trailing commas are fine
            workspace: {
                backend: "local",
                limits: { cpu_millis: 500, memory_mb: 256, timeout_secs: 30 },
                env: { CI: "1" },
            },
            telemetry: { batch_size: 10, max_buffer_size: 50, sink: { kind: "none" } },
        }"#,
    )
    .unwrap();
    config.validate().unwrap();

    let workspace = WorkspaceConfig::from_settings(&config.workspace);
    assert_eq!(workspace.limits.timeout_secs(), 30);
    assert_eq!(workspace.env().get("CI").map(String::as_str), Some("1"));

    assert!(matches!(config.telemetry.sink, SinkSettings::None));
    let client = HookClient::from_settings(&config.telemetry).unwrap();
    assert_eq!(client.buffer().config().max_buffer_size, 50);

    let dir = TempDir::new().unwrap();
    let mut config = config;
    config.workspace.base_dir = Some(dir.path().to_path_buf());
    assert_eq!(provider_for(config.workspace.backend, &config).unwrap().name(), "local");
}

#[test]
fn test_invalid_values_are_all_reported() {
    let config = Config::parse(
        r#"{ telemetry: { batch_size: 0, max_retry_attempts: 0 }, workspace: { backend: "container" } }"#,
    )
    .unwrap();
    let message = config.validate().unwrap_err().to_string();
    assert!(message.contains("batch_size"), "{}", message);
    assert!(message.contains("max_retry_attempts"), "{}", message);
    assert!(message.contains("image"), "{}", message);
}

#[test]
fn test_cli_routes_subcommands() {
    assert!(matches!(parse_cli(&["agentwatch", "version"]).command, Commands::Version));
    assert!(matches!(
        parse_cli(&["agentwatch", "parse", "x.jsonl"]).command,
        Commands::Parse(_)
    ));
    let cli: Cli = parse_cli(&["agentwatch", "--json-logs", "run", "--", "true"]);
    assert!(cli.json_logs);
    assert!(matches!(cli.command, Commands::Run(_)));
}
