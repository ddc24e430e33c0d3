//! One-pass, replayable view over a session's output lines.

use crate::client::HookClient;
use crate::error::TelemetryError;
use crate::parser::EventStreamParser;
use crate::Result;
use agentwatch_core::types::{ObservabilityEvent, SessionSummary};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;

type Source = Pin<Box<dyn Stream<Item = String> + Send>>;

/// A boxed stream borrowed from a [`SessionOutputStream`].
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

struct BufferedLine {
    raw: String,
    events: Vec<ObservabilityEvent>,
}

/// Parses a line source once and serves raw lines and events from one pass.
///
/// The first traversal pulls from the source and keeps every line and its
/// events. Later traversals replay the kept copy, then continue pulling if
/// an earlier traversal stopped part way. Events are handed to the attached
/// [`HookClient`] once, when their line is first read.
pub struct SessionOutputStream {
    source: Option<Source>,
    parser: EventStreamParser,
    lines: Vec<BufferedLine>,
    client: Option<Arc<HookClient>>,
}

impl SessionOutputStream {
    pub fn new<S>(session_id: impl Into<String>, source: S) -> Self
    where
        S: Stream<Item = String> + Send + 'static,
    {
        Self {
            source: Some(Box::pin(source)),
            parser: EventStreamParser::new(session_id),
            lines: Vec::new(),
            client: None,
        }
    }

    /// Wrap an in-memory sequence of lines.
    pub fn from_lines<I, S>(session_id: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        Self::new(session_id, futures::stream::iter(lines))
    }

    /// Forward every parsed event to `client`.
    pub fn with_client(mut self, client: Arc<HookClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn session_id(&self) -> &str {
        self.parser.session_id()
    }

    /// Whether the source has been read to its end.
    pub fn is_consumed(&self) -> bool {
        self.source.is_none()
    }

    /// Lines read from the source so far.
    pub fn lines_read(&self) -> usize {
        self.lines.len()
    }

    /// `(raw_line, event)` pairs. A line yields one pair per event, or a
    /// single `(line, None)` pair when it produced none.
    pub fn tee(&mut self) -> BoxStream<'_, (String, Option<ObservabilityEvent>)> {
        Box::pin(stream! {
            let mut index = 0;
            while self.fill(index).await {
                let line = &self.lines[index];
                if line.events.is_empty() {
                    let pair = (line.raw.clone(), None);
                    yield pair;
                } else {
                    let pairs: Vec<_> = line
                        .events
                        .iter()
                        .map(|e| (line.raw.clone(), Some(e.clone())))
                        .collect();
                    for pair in pairs {
                        yield pair;
                    }
                }
                index += 1;
            }
        })
    }

    /// Only the parsed events, in order.
    pub fn events(&mut self) -> BoxStream<'_, ObservabilityEvent> {
        Box::pin(stream! {
            let mut index = 0;
            while self.fill(index).await {
                let events = self.lines[index].events.clone();
                for event in events {
                    yield event;
                }
                index += 1;
            }
        })
    }

    /// Only the raw lines, once each.
    pub fn raw(&mut self) -> BoxStream<'_, String> {
        Box::pin(stream! {
            let mut index = 0;
            while self.fill(index).await {
                let raw = self.lines[index].raw.clone();
                yield raw;
                index += 1;
            }
        })
    }

    /// Drain the source and return the final summary.
    pub async fn consume(&mut self) -> Result<&SessionSummary> {
        let mut index = self.lines.len();
        while self.fill(index).await {
            index += 1;
        }
        self.get_summary()
    }

    /// The final summary. Fails until the source has been drained.
    pub fn get_summary(&self) -> Result<&SessionSummary> {
        if !self.is_consumed() {
            return Err(TelemetryError::NotYetConsumed);
        }
        self.parser.get_summary()
    }

    /// Drain the source and take the summary.
    pub async fn into_summary(mut self) -> Result<SessionSummary> {
        self.consume().await?;
        self.parser.into_summary()
    }

    /// Make sure line `index` is buffered. Returns false past the end.
    async fn fill(&mut self, index: usize) -> bool {
        while self.lines.len() <= index {
            let Some(source) = self.source.as_mut() else {
                return false;
            };
            match source.next().await {
                Some(raw) => self.ingest(raw).await,
                None => {
                    self.source = None;
                    return false;
                }
            }
        }
        true
    }

    async fn ingest(&mut self, raw: String) {
        let events = self.parser.parse_line(&raw);
        if let Some(client) = self.client.clone() {
            for event in &events {
                client.emit_observability(event).await;
            }
        }
        self.lines.push(BufferedLine { raw, events });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferConfig;
    use crate::client::{ClientConfig, RetryPolicy};
    use crate::sink::MemorySink;
    use std::time::Duration;

    fn lines() -> Vec<&'static str> {
        vec![
            r#"{"type":"system","subtype":"init","model":"m"}"#,
            "garbage",
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{}}],"usage":{"input_tokens":3}}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1"}]}}"#,
            r#"{"type":"result","is_error":false,"duration_ms":10}"#,
        ]
    }

    #[tokio::test]
    async fn test_tee_pairs() {
        let mut output = SessionOutputStream::from_lines("s1", lines());
        let pairs: Vec<_> = output.tee().collect().await;

        // init, garbage, tool start + token usage, completion, session end
        assert_eq!(pairs.len(), 6);
        assert!(pairs[1].1.is_none());
        assert_eq!(pairs[1].0, "garbage");
        assert_eq!(pairs[2].0, pairs[3].0);
        assert_eq!(
            pairs[3].1.as_ref().map(|e| e.event_type()),
            Some("token_usage")
        );
    }

    #[tokio::test]
    async fn test_replay_matches_first_pass() {
        let mut output = SessionOutputStream::from_lines("s1", lines());
        let first: Vec<_> = output.tee().collect().await;
        let second: Vec<_> = output.tee().collect().await;

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1, b.1);
        }

        let raw: Vec<String> = output.raw().collect().await;
        assert_eq!(raw, lines());
        let events: Vec<_> = output.events().collect().await;
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_source_read_once() {
        let pulls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&pulls);
        let source = futures::stream::iter(lines().into_iter().map(String::from)).inspect(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        let mut output = SessionOutputStream::new("s1", source);
        let _: Vec<_> = output.raw().collect().await;
        let _: Vec<_> = output.events().collect().await;
        let _: Vec<_> = output.tee().collect().await;
        assert_eq!(pulls.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_partial_traversal_resumes() {
        let mut output = SessionOutputStream::from_lines("s1", lines());
        let head: Vec<String> = output.raw().take(2).collect().await;
        assert_eq!(head.len(), 2);
        assert!(!output.is_consumed());
        assert!(matches!(
            output.get_summary(),
            Err(TelemetryError::NotYetConsumed)
        ));

        let all: Vec<String> = output.raw().collect().await;
        assert_eq!(all.len(), 5);
        assert!(output.is_consumed());
        assert!(output.lines_read() > 0);
        assert_eq!(output.get_summary().unwrap().tool_calls().get("Bash"), Some(&1));
    }

    #[tokio::test]
    async fn test_consume_and_summary() {
        let output = SessionOutputStream::from_lines("s1", lines());
        let summary = output.into_summary().await.unwrap();
        assert_eq!(summary.total_tool_calls(), 1);
        assert_eq!(summary.duration_ms(), Some(10));
        assert_eq!(summary.event_count(), 5);
    }

    #[tokio::test]
    async fn test_events_reach_client_once() {
        let sink = Arc::new(MemorySink::new());
        let client = Arc::new(HookClient::new(
            sink.clone(),
            ClientConfig {
                buffer: BufferConfig::default().with_flush_interval(Duration::from_secs(3600)),
                retry: RetryPolicy::new(1, Duration::ZERO),
            },
        ));

        let mut output = SessionOutputStream::from_lines("s1", lines()).with_client(client.clone());
        let _: Vec<_> = output.tee().collect().await;
        let _: Vec<_> = output.tee().collect().await;
        client.flush().await;

        let delivered = sink.events().await;
        assert_eq!(delivered.len(), 5);
        assert_eq!(delivered[0].event_type().as_str(), "session_started");
        assert_eq!(delivered[0].session_id(), "s1");
    }
}
