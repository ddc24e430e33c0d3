//! Hook client: the producer-facing front of the event buffer.

use crate::buffer::{BufferConfig, BufferStats, EventBuffer};
use crate::sink::{sink_from_settings, EventSink};
use crate::Result;
use agentwatch_core::config::TelemetrySettings;
use agentwatch_core::types::{HookEvent, HookEventType, ObservabilityEvent};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Bounded per-flush retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delivery attempts per batch, the first one included.
    pub max_attempts: u32,

    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub buffer: BufferConfig,
    pub retry: RetryPolicy,
}

impl From<&TelemetrySettings> for ClientConfig {
    fn from(settings: &TelemetrySettings) -> Self {
        Self {
            buffer: BufferConfig::from(settings),
            retry: RetryPolicy::new(
                settings.max_retry_attempts,
                Duration::from_millis(settings.retry_delay_ms),
            ),
        }
    }
}

/// Emits hook events through a retrying [`EventBuffer`].
///
/// One client per session. Emitting never fails; delivery problems are
/// logged and counted in [`stats`](Self::stats).
pub struct HookClient {
    buffer: EventBuffer,
}

impl HookClient {
    pub fn new(sink: Arc<dyn EventSink>, config: ClientConfig) -> Self {
        Self {
            buffer: EventBuffer::with_retry(sink, config.buffer, config.retry),
        }
    }

    /// Build a client and its sink from the telemetry config section.
    pub fn from_settings(settings: &TelemetrySettings) -> Result<Self> {
        let sink = sink_from_settings(&settings.sink)?;
        Ok(Self::new(sink, ClientConfig::from(settings)))
    }

    pub async fn start(&self) {
        self.buffer.start().await;
    }

    /// Stop the flush loop and deliver what is left.
    pub async fn stop(&self) {
        self.buffer.stop().await;
        self.buffer.close_sink().await;
    }

    pub async fn emit(&self, event: HookEvent) {
        self.buffer.add(event).await;
    }

    pub async fn emit_observability(&self, event: &ObservabilityEvent) {
        self.emit(HookEvent::from(event)).await;
    }

    pub async fn emit_session_start(&self, session_id: &str, data: Value) {
        self.emit(HookEvent::new(HookEventType::SessionStart, session_id).with_payload(data))
            .await;
    }

    pub async fn emit_session_end(&self, session_id: &str, data: Value) {
        self.emit(HookEvent::new(HookEventType::SessionEnd, session_id).with_payload(data))
            .await;
    }

    pub async fn emit_pre_tool_use(&self, session_id: &str, tool_name: &str, tool_input: Value) {
        let event = HookEvent::new(HookEventType::PreToolUse, session_id)
            .with_data("tool_name", json!(tool_name))
            .with_data("tool_input", tool_input);
        self.emit(event).await;
    }

    pub async fn emit_post_tool_use(
        &self,
        session_id: &str,
        tool_name: &str,
        success: bool,
        output: Value,
    ) {
        let event = HookEvent::new(HookEventType::PostToolUse, session_id)
            .with_data("tool_name", json!(tool_name))
            .with_data("success", json!(success))
            .with_data("tool_output", output);
        self.emit(event).await;
    }

    pub async fn flush(&self) {
        self.buffer.flush().await;
    }

    pub async fn stats(&self) -> BufferStats {
        self.buffer.stats().await
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use agentwatch_core::types::EventKind;

    fn client(sink: Arc<MemorySink>, batch_size: usize) -> HookClient {
        HookClient::new(
            sink,
            ClientConfig {
                buffer: BufferConfig::default()
                    .with_batch_size(batch_size)
                    .with_flush_interval(Duration::from_secs(3600)),
                retry: RetryPolicy::new(2, Duration::ZERO),
            },
        )
    }

    #[tokio::test]
    async fn test_emit_helpers() {
        let sink = Arc::new(MemorySink::new());
        let client = client(sink.clone(), 100);

        client.emit_session_start("s1", json!({"model": "m"})).await;
        client
            .emit_pre_tool_use("s1", "Bash", json!({"command": "ls"}))
            .await;
        client
            .emit_post_tool_use("s1", "Bash", true, json!("ok"))
            .await;
        client
            .emit_observability(&ObservabilityEvent::new(
                "s1",
                EventKind::Error {
                    error_message: "boom".to_string(),
                },
            ))
            .await;
        client.flush().await;

        let events = sink.events().await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].event_type(), &HookEventType::SessionStart);
        assert_eq!(events[0].data()["model"], "m");
        assert_eq!(events[1].data()["tool_name"], "Bash");
        assert_eq!(events[2].data()["success"], true);
        assert_eq!(events[3].event_type().as_str(), "error");
    }

    #[tokio::test]
    async fn test_stop_flushes_and_retries_are_bounded() {
        let sink = Arc::new(MemorySink::new());
        let client = client(sink.clone(), 100);
        client.start().await;

        client.emit_session_end("s1", json!({})).await;
        sink.fail_next(5);
        client.stop().await;

        assert_eq!(sink.attempts(), 2);
        let stats = client.stats().await;
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = TelemetrySettings {
            max_retry_attempts: 5,
            retry_delay_ms: 20,
            ..Default::default()
        };
        let config = ClientConfig::from(&settings);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay, Duration::from_millis(20));
    }

    #[test]
    fn test_from_default_settings() {
        let client = HookClient::from_settings(&TelemetrySettings::default()).unwrap();
        assert_eq!(client.buffer().config().batch_size, 100);
    }
}
