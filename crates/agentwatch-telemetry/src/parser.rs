//! Line-oriented parser for agent event streams.
//!
//! Input is newline-delimited JSON records, optionally wrapped in asciicast v2
//! output frames (`[offset, "o", "<record>"]`). Recognized record shapes:
//!
//! | record                                   | emits                                      |
//! |------------------------------------------|--------------------------------------------|
//! | `system` / `init`                        | `session_started`                          |
//! | `assistant` with `tool_use` blocks       | `tool_execution_started` (+ `subagent_started` for `Task`), `token_usage` |
//! | `user` with `tool_result` blocks         | `tool_execution_completed` (+ `subagent_stopped`) |
//! | `result`                                 | `error` if failed, then `session_completed` |
//! | `error`                                  | `error`                                    |
//!
//! Anything else is dropped without complaint.

use crate::error::TelemetryError;
use crate::Result;
use agentwatch_core::types::{EventKind, ObservabilityEvent, SessionSummary, TokenUsage};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// Tool name reported for a completion whose call was never seen.
pub const UNKNOWN_TOOL: &str = "unknown";

/// Tool names that dispatch a sub-agent.
const SUBAGENT_TOOLS: &[&str] = &["Task", "Agent"];

/// Default bound on in-flight tool calls remembered by the parser.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Where a timing offset came from. Offsets from different sources are never compared.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Offset {
    /// Recording frame offset, in milliseconds.
    Frame(f64),
    /// Record wall-clock timestamp, in epoch milliseconds.
    Wall(f64),
}

impl Offset {
    fn millis_until(self, later: Offset) -> Option<u64> {
        match (self, later) {
            (Offset::Frame(a), Offset::Frame(b)) | (Offset::Wall(a), Offset::Wall(b)) => {
                Some((b - a).max(0.0).round() as u64)
            }
            _ => None,
        }
    }
}

/// One decoded record with its timing information.
struct Record {
    value: Value,
    offset: Option<Offset>,
    timestamp: Option<DateTime<Utc>>,
}

/// An in-flight tool call.
#[derive(Debug, Clone)]
struct PendingCall {
    tool_name: String,
    offset: Option<Offset>,
    subagent: Option<String>,
}

/// Bounded map of call id to pending call. Oldest entries are evicted first.
#[derive(Debug)]
struct CallCache {
    capacity: usize,
    calls: HashMap<String, PendingCall>,
    order: VecDeque<String>,
}

impl CallCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            calls: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, id: String, call: PendingCall) {
        if self.calls.insert(id.clone(), call).is_none() {
            self.order.push_back(id);
        }
        while self.calls.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    if self.calls.remove(&oldest).is_some() {
                        debug!(tool_use_id = %oldest, "Evicted unmatched tool call");
                    }
                }
                None => break,
            }
        }
        // Drop ids already consumed so `order` stays bounded too.
        if self.order.len() > self.capacity * 2 {
            let calls = &self.calls;
            self.order.retain(|id| calls.contains_key(id));
        }
    }

    fn get(&self, id: &str) -> Option<&PendingCall> {
        self.calls.get(id)
    }

    fn take(&mut self, id: &str) -> Option<PendingCall> {
        self.calls.remove(id)
    }

    fn len(&self) -> usize {
        self.calls.len()
    }
}

/// Turns raw stream lines into observability events and a running summary.
///
/// Never fails on input: malformed and unrecognized lines produce no events.
#[derive(Debug)]
pub struct EventStreamParser {
    session_id: String,
    pending: CallCache,
    summary: SessionSummary,
    lines_processed: u64,
}

impl EventStreamParser {
    /// Create a parser for one session.
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            summary: SessionSummary::new(session_id.clone()),
            session_id,
            pending: CallCache::new(DEFAULT_CACHE_CAPACITY),
            lines_processed: 0,
        }
    }

    /// Bound the number of in-flight tool calls remembered.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.pending = CallCache::new(capacity);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Lines fed so far, including dropped ones.
    pub fn lines_processed(&self) -> u64 {
        self.lines_processed
    }

    /// Tool calls started but not yet completed.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// The running summary. Fails until at least one line has been processed.
    pub fn get_summary(&self) -> Result<&SessionSummary> {
        if self.lines_processed == 0 {
            return Err(TelemetryError::NotYetConsumed);
        }
        Ok(&self.summary)
    }

    /// Consume the parser and return its summary.
    pub fn into_summary(self) -> Result<SessionSummary> {
        if self.lines_processed == 0 {
            return Err(TelemetryError::NotYetConsumed);
        }
        Ok(self.summary)
    }

    /// Feed many lines, collecting every event in order.
    pub fn parse_lines<I, S>(&mut self, lines: I) -> Vec<ObservabilityEvent>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .flat_map(|line| self.parse_line(line.as_ref()))
            .collect()
    }

    /// Feed one line and return the events it produced, in order.
    pub fn parse_line(&mut self, line: &str) -> Vec<ObservabilityEvent> {
        self.lines_processed += 1;
        let mut events = Vec::new();
        for record in decode(line) {
            self.handle(record, &mut events);
        }
        for _ in &events {
            self.summary.record_event();
        }
        events
    }

    fn handle(&mut self, record: Record, events: &mut Vec<ObservabilityEvent>) {
        let Some(kind) = record.value.get("type").and_then(Value::as_str) else {
            trace!("Dropping record without type");
            return;
        };
        match kind {
            "system" => self.on_system(&record, events),
            "assistant" => self.on_assistant(&record, events),
            "user" => self.on_user(&record, events),
            "result" => self.on_result(&record, events),
            "error" => self.on_error(&record, events),
            other => trace!(record_type = other, "Ignoring record"),
        }
    }

    fn event(&self, record: &Record, kind: EventKind) -> ObservabilityEvent {
        let mut event =
            ObservabilityEvent::new(self.session_id.clone(), kind).with_raw(record.value.clone());
        if let Some(ts) = record.timestamp {
            event.timestamp = ts;
        }
        event
    }

    fn on_system(&mut self, record: &Record, events: &mut Vec<ObservabilityEvent>) {
        if record.value.get("subtype").and_then(Value::as_str) != Some("init") {
            return;
        }
        let at = record.timestamp.unwrap_or_else(Utc::now);
        self.summary.mark_started(at);
        let model = str_field(&record.value, "model");
        events.push(self.event(record, EventKind::SessionStarted { model }));
    }

    fn on_assistant(&mut self, record: &Record, events: &mut Vec<ObservabilityEvent>) {
        let parent = str_field(&record.value, "parent_tool_use_id");
        let Some(message) = record.value.get("message") else {
            return;
        };
        if parent.is_none() {
            self.summary.record_turn();
        }

        // Sub-agent owning this record, if any.
        let owner = parent
            .as_deref()
            .and_then(|id| self.pending.get(id))
            .and_then(|call| call.subagent.clone());

        for block in content_blocks(message) {
            if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                continue;
            }
            let (Some(id), Some(name)) = (str_field(block, "id"), str_field(block, "name")) else {
                trace!("Dropping tool_use block without id or name");
                continue;
            };
            let input = block.get("input").cloned().unwrap_or(Value::Null);

            self.summary.record_tool_call(&name);
            if let Some(owner) = &owner {
                self.summary.record_subagent_tool_call(owner, &name);
            }

            let subagent = SUBAGENT_TOOLS
                .contains(&name.as_str())
                .then(|| subagent_name(&input));

            self.pending.insert(
                id.clone(),
                PendingCall {
                    tool_name: name.clone(),
                    offset: record.offset,
                    subagent: subagent.clone(),
                },
            );

            events.push(self.event(
                record,
                EventKind::ToolExecutionStarted {
                    tool_name: name,
                    tool_use_id: id.clone(),
                    tool_input: input,
                    parent_tool_use_id: parent.clone(),
                },
            ));

            if let Some(subagent_name) = subagent {
                self.summary.record_subagent(&subagent_name);
                events.push(self.event(
                    record,
                    EventKind::SubagentStarted {
                        subagent_name,
                        subagent_tool_use_id: id.clone(),
                        parent_tool_use_id: id,
                    },
                ));
            }
        }

        if let Some(usage) = message
            .get("usage")
            .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok())
            .filter(|u| !u.is_empty())
        {
            self.summary.record_tokens(&usage);
            events.push(self.event(record, EventKind::TokenUsage { usage }));
        }
    }

    fn on_user(&mut self, record: &Record, events: &mut Vec<ObservabilityEvent>) {
        let parent = str_field(&record.value, "parent_tool_use_id");
        let Some(message) = record.value.get("message") else {
            return;
        };

        for block in content_blocks(message) {
            if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                continue;
            }
            let Some(id) = str_field(block, "tool_use_id") else {
                trace!("Dropping tool_result block without tool_use_id");
                continue;
            };
            let success = !block
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            let call = self.pending.take(&id);
            if call.is_none() {
                debug!(tool_use_id = %id, "Tool result without a matching call");
            }
            let tool_name = call
                .as_ref()
                .map_or_else(|| UNKNOWN_TOOL.to_string(), |c| c.tool_name.clone());

            events.push(self.event(
                record,
                EventKind::ToolExecutionCompleted {
                    tool_name,
                    tool_use_id: id.clone(),
                    success,
                    parent_tool_use_id: parent.clone(),
                },
            ));

            if let Some(PendingCall {
                subagent: Some(subagent_name),
                offset,
                ..
            }) = call
            {
                let duration_ms = match (offset, record.offset) {
                    (Some(start), Some(end)) => start.millis_until(end),
                    _ => None,
                };
                events.push(self.event(
                    record,
                    EventKind::SubagentStopped {
                        subagent_name,
                        subagent_tool_use_id: id.clone(),
                        parent_tool_use_id: id,
                        success,
                        duration_ms,
                    },
                ));
            }
        }
    }

    fn on_result(&mut self, record: &Record, events: &mut Vec<ObservabilityEvent>) {
        let value = &record.value;
        let is_error = value
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let tokens = value
            .get("usage")
            .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok());
        let total_cost_usd = value
            .get("total_cost_usd")
            .or_else(|| value.get("cost_usd"))
            .and_then(Value::as_f64);

        self.summary.apply_reported(
            total_cost_usd,
            value.get("duration_ms").and_then(Value::as_u64),
            value.get("num_turns").and_then(Value::as_u64),
            tokens,
        );
        self.summary
            .mark_completed(record.timestamp.unwrap_or_else(Utc::now), !is_error);

        let error_message = is_error.then(|| {
            str_field(value, "result")
                .or_else(|| str_field(value, "subtype"))
                .unwrap_or_else(|| "session failed".to_string())
        });
        if let Some(message) = &error_message {
            self.summary.set_error(message.clone());
            events.push(self.event(
                record,
                EventKind::Error {
                    error_message: message.clone(),
                },
            ));
        }

        events.push(self.event(
            record,
            EventKind::SessionCompleted {
                success: !is_error,
                duration_ms: self.summary.duration_ms(),
                total_cost_usd: self.summary.total_cost_usd(),
                tool_usage: self.summary.tool_calls().clone(),
                error_message,
            },
        ));
    }

    fn on_error(&mut self, record: &Record, events: &mut Vec<ObservabilityEvent>) {
        let value = &record.value;
        let message = value
            .get("error")
            .and_then(|e| {
                e.as_str()
                    .map(str::to_string)
                    .or_else(|| str_field(e, "message"))
            })
            .or_else(|| str_field(value, "message"))
            .unwrap_or_else(|| "unknown error".to_string());
        events.push(self.event(
            record,
            EventKind::Error {
                error_message: message,
            },
        ));
    }
}

/// Decode one raw line into zero or more typed records.
fn decode(line: &str) -> Vec<Record> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        trace!("Dropping non-JSON line");
        return Vec::new();
    };

    match value {
        // Recording frame: [offset_seconds, "o", "<text>"]
        Value::Array(frame) => {
            let (Some(offset), Some("o"), Some(text)) = (
                frame.first().and_then(Value::as_f64),
                frame.get(1).and_then(Value::as_str),
                frame.get(2).and_then(Value::as_str),
            ) else {
                return Vec::new();
            };
            text.lines()
                .filter_map(|inner| serde_json::from_str::<Value>(inner.trim()).ok())
                .filter_map(|inner| typed_record(inner, Some(Offset::Frame(offset * 1000.0))))
                .collect()
        }
        Value::Object(_) => typed_record(value, None).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Keep only objects with a string `type`; recording headers carry none.
fn typed_record(value: Value, frame_offset: Option<Offset>) -> Option<Record> {
    value.get("type").and_then(Value::as_str)?;
    let timestamp = value
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));
    let offset =
        frame_offset.or_else(|| timestamp.map(|ts| Offset::Wall(ts.timestamp_millis() as f64)));
    Some(Record {
        value,
        offset,
        timestamp,
    })
}

fn content_blocks(message: &Value) -> impl Iterator<Item = &Value> {
    message
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn subagent_name(input: &Value) -> String {
    str_field(input, "subagent_type")
        .or_else(|| str_field(input, "description"))
        .unwrap_or_else(|| "task".to_string())
}
