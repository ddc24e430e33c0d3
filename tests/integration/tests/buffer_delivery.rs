//! Event buffer and hook client delivery scenarios.

use agentwatch_core::config::{SinkSettings, TelemetrySettings};
use agentwatch_integration_tests::hook_events;
use agentwatch_telemetry::{
    BufferConfig, ClientConfig, EventBuffer, EventSink, FileSink, HookClient, MemorySink,
    RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;

fn quiet(batch_size: usize) -> BufferConfig {
    BufferConfig::default()
        .with_batch_size(batch_size)
        .with_flush_interval(Duration::from_secs(3600))
}

#[tokio::test]
async fn test_batch_size_three() {
    let sink = Arc::new(MemorySink::new());
    let buffer = EventBuffer::new(sink.clone(), quiet(3));
    let events = hook_events("s1", 3);

    buffer.add(events[0].clone()).await;
    buffer.add(events[1].clone()).await;
    assert_eq!(sink.batches().await.len(), 0);

    buffer.add(events[2].clone()).await;
    let batches = sink.batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], events);
}

#[tokio::test]
async fn test_overflow_keeps_newest_ninety_percent() {
    let sink = Arc::new(MemorySink::new());
    let buffer = EventBuffer::new(sink.clone(), quiet(1000).with_max_buffer_size(100));
    let events = hook_events("s1", 101);
    for event in &events {
        buffer.add(event.clone()).await;
    }

    // The 101st add found the queue full and evicted the oldest 10.
    assert_eq!(buffer.len().await, 91);
    buffer.flush().await;
    assert_eq!(sink.events().await, events[10..].to_vec());
    assert_eq!(buffer.stats().await.evicted, 10);
}

#[tokio::test]
async fn test_conservation_under_failures() {
    let sink = Arc::new(MemorySink::new());
    let client = HookClient::new(
        sink.clone(),
        ClientConfig {
            buffer: quiet(4),
            retry: RetryPolicy::new(2, Duration::ZERO),
        },
    );

    let events = hook_events("s1", 23);
    for (i, event) in events.iter().enumerate() {
        // Some flushes recover on the retry, some exhaust it.
        match i {
            3 => sink.fail_next(1),
            7 => sink.fail_next(2),
            15 => sink.fail_next(3),
            _ => {}
        }
        client.emit(event.clone()).await;
    }
    client.stop().await;
    client.flush().await;

    let stats = client.stats().await;
    assert_eq!(stats.added, 23);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.delivered as usize, sink.event_count().await);
    assert!(stats.discarded > 0);
    assert_eq!(stats.added, stats.delivered + stats.discarded + stats.evicted);
}

#[tokio::test]
async fn test_background_flush_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/events.jsonl");
    let sink: Arc<dyn EventSink> = Arc::new(FileSink::new(&path));

    let buffer = EventBuffer::new(
        sink,
        quiet(100).with_flush_interval(Duration::from_millis(50)),
    );
    buffer.start().await;
    for event in hook_events("s1", 5) {
        buffer.add(event).await;
    }
    tokio::time::sleep(Duration::from_millis(400)).await;

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 5);

    buffer.stop().await;
    assert!(!buffer.is_running().await);
}

#[tokio::test]
async fn test_client_from_file_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let settings = TelemetrySettings {
        sink: SinkSettings::File {
            path: Some(path.clone()),
        },
        ..Default::default()
    };

    let client = HookClient::from_settings(&settings).unwrap();
    client.start().await;
    client
        .emit_pre_tool_use("s1", "Bash", serde_json::json!({"command": "ls"}))
        .await;
    client.stop().await;

    let content = std::fs::read_to_string(&path).unwrap();
    let record: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(record["event_type"], "PreToolUse");
    assert_eq!(record["data"]["tool_name"], "Bash");
}
