//! Workspaces feeding the telemetry pipeline.

use agentwatch_core::Backend;
use agentwatch_integration_tests::four_line_session;
use agentwatch_sandbox::{
    ExecOptions, LocalProvider, SandboxError, WorkspaceConfig, WorkspaceProvider,
    TIMEOUT_EXIT_CODE,
};
use agentwatch_telemetry::{
    BufferConfig, ClientConfig, HookClient, MemorySink, RetryPolicy, SessionOutputStream,
};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn provider(dir: &tempfile::TempDir) -> LocalProvider {
    LocalProvider::new(dir.path())
}

#[tokio::test]
async fn test_timeout_is_a_result_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir);
    let ws = provider
        .create(WorkspaceConfig::new(Backend::Local))
        .await
        .unwrap();

    let started = Instant::now();
    let result = provider
        .execute(
            &ws,
            "sleep 30",
            ExecOptions::new().with_timeout(Duration::from_secs(1)),
        )
        .await;

    assert!(result.timed_out);
    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(!result.success());
    assert!(started.elapsed() < Duration::from_secs(10));

    provider.destroy(ws).await;
}

#[tokio::test]
async fn test_file_roundtrip_and_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir);
    let ws = provider
        .create(WorkspaceConfig::new(Backend::Local))
        .await
        .unwrap();

    let content: Vec<u8> = (0..=255u8).chain([b'\r', b'\n', 0]).collect();
    provider
        .write_file(&ws, Path::new("deep/dir/blob.bin"), &content)
        .await
        .unwrap();
    assert_eq!(
        provider.read_file(&ws, Path::new("deep/dir/blob.bin")).await.unwrap(),
        content
    );
    assert!(provider
        .file_exists(&ws, Path::new("deep/dir/blob.bin"))
        .await
        .unwrap());

    let missing = provider.read_file(&ws, Path::new("nope.txt")).await;
    assert!(matches!(missing, Err(SandboxError::FileNotFound(_))));

    let escape = provider
        .write_file(&ws, Path::new("../outside.txt"), b"x")
        .await;
    assert!(escape.is_err());

    provider.destroy(ws).await;
}

#[tokio::test]
async fn test_explicit_secret_beats_plugin_default() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir);
    let config = WorkspaceConfig::new(Backend::Local)
        .with_secret("K", "v1")
        .resolve_plugin_env([("K", "v2"), ("OTHER", "d")]);
    assert_eq!(config.secret("K").unwrap().expose_secret(), "v1");

    let ws = provider.create(config).await.unwrap();
    let result = provider
        .execute(&ws, "printf '%s,%s' \"$K\" \"$OTHER\"", ExecOptions::new())
        .await;
    assert!(result.success(), "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "v1,d");

    provider.destroy(ws).await;
}

#[tokio::test]
async fn test_streamed_session_reaches_sink() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(&dir);
    let ws = provider
        .create(WorkspaceConfig::new(Backend::Local))
        .await
        .unwrap();

    let mut script = String::new();
    for line in four_line_session() {
        script.push_str(&line);
        script.push('\n');
    }
    provider
        .write_file(&ws, Path::new("session.jsonl"), script.as_bytes())
        .await
        .unwrap();

    let sink = Arc::new(MemorySink::new());
    let client = Arc::new(HookClient::new(
        sink.clone(),
        ClientConfig {
            buffer: BufferConfig::default().with_batch_size(2),
            retry: RetryPolicy::new(3, Duration::ZERO),
        },
    ));
    client.start().await;

    let lines = provider.stream(&ws, "cat session.jsonl");
    let mut output = SessionOutputStream::new("abc", lines).with_client(client.clone());

    let first: Vec<_> = output.tee().collect().await;
    let replay: Vec<_> = output.tee().collect().await;
    assert_eq!(first.len(), 4);
    assert_eq!(
        first.iter().map(|(raw, _)| raw.clone()).collect::<Vec<_>>(),
        replay.iter().map(|(raw, _)| raw.clone()).collect::<Vec<_>>()
    );

    let summary = output.get_summary().unwrap().clone();
    assert_eq!(summary.tool_calls().get("Bash"), Some(&1));

    client.stop().await;
    let delivered = sink.events().await;
    assert_eq!(delivered.len(), 4);
    assert!(delivered.iter().all(|e| e.session_id() == "abc"));

    provider.destroy(ws).await;
}
