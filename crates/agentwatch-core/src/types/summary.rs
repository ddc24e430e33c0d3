//! Running aggregate of a session's events.

use super::usage::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate counters, tokens, cost and duration for one session.
///
/// Owned and mutated by the parser that produced it; consumers only ever see
/// it through a shared reference. `total_tool_calls` is maintained by
/// [`record_tool_call`](Self::record_tool_call) so it always equals the sum of
/// the per-tool counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,

    event_count: u64,

    tool_calls: BTreeMap<String, u64>,

    total_tool_calls: u64,

    turns: u64,

    tokens: TokenUsage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_cost_usd: Option<f64>,

    /// Duration reported by the agent's terminal result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reported_duration_ms: Option<u64>,

    /// Materialized [`duration_ms`](Self::duration_ms) for serialized output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,

    subagent_count: u64,

    subagent_names: Vec<String>,

    subagent_tool_usage: BTreeMap<String, BTreeMap<String, u64>>,

    success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl SessionSummary {
    /// Create an empty summary for a session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Number of events emitted for this session.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Per-tool-name call counts.
    pub fn tool_calls(&self) -> &BTreeMap<String, u64> {
        &self.tool_calls
    }

    pub fn total_tool_calls(&self) -> u64 {
        self.total_tool_calls
    }

    /// Conversation turns.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    pub fn tokens(&self) -> &TokenUsage {
        &self.tokens
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.tokens.input_tokens
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.tokens.output_tokens
    }

    pub fn total_cost_usd(&self) -> Option<f64> {
        self.total_cost_usd
    }

    pub fn subagent_count(&self) -> u64 {
        self.subagent_count
    }

    pub fn subagent_names(&self) -> &[String] {
        &self.subagent_names
    }

    /// Per-sub-agent tool usage, keyed by sub-agent name.
    pub fn subagent_tool_usage(&self) -> &BTreeMap<String, BTreeMap<String, u64>> {
        &self.subagent_tool_usage
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Session duration in milliseconds.
    ///
    /// The agent-reported duration wins; otherwise it is derived from
    /// `completed_at - started_at`. `None` while either bound is unknown.
    pub fn duration_ms(&self) -> Option<u64> {
        if let Some(reported) = self.reported_duration_ms {
            return Some(reported);
        }
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                Some(end.signed_duration_since(start).num_milliseconds().max(0) as u64)
            }
            _ => None,
        }
    }

    // --- Mutation (parser-owned) ---

    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(at);
        }
        self.refresh_duration();
    }

    pub fn mark_completed(&mut self, at: DateTime<Utc>, success: bool) {
        self.completed_at = Some(at);
        self.success = success;
        self.refresh_duration();
    }

    pub fn record_event(&mut self) {
        self.event_count += 1;
    }

    /// Tally one call of `tool_name`.
    pub fn record_tool_call(&mut self, tool_name: &str) {
        *self.tool_calls.entry(tool_name.to_string()).or_insert(0) += 1;
        self.total_tool_calls += 1;
    }

    pub fn record_turn(&mut self) {
        self.turns += 1;
    }

    pub fn record_tokens(&mut self, usage: &TokenUsage) {
        self.tokens.add(usage);
    }

    /// Register a dispatched sub-agent. Names are kept unique, the count is not.
    pub fn record_subagent(&mut self, name: &str) {
        self.subagent_count += 1;
        if !self.subagent_names.iter().any(|n| n == name) {
            self.subagent_names.push(name.to_string());
        }
    }

    /// Tally a tool call made from inside a sub-agent.
    pub fn record_subagent_tool_call(&mut self, subagent: &str, tool_name: &str) {
        *self
            .subagent_tool_usage
            .entry(subagent.to_string())
            .or_default()
            .entry(tool_name.to_string())
            .or_insert(0) += 1;
    }

    /// Apply the authoritative totals from a terminal result record.
    ///
    /// Every `Some` value replaces the parser-computed one.
    pub fn apply_reported(
        &mut self,
        total_cost_usd: Option<f64>,
        duration_ms: Option<u64>,
        turns: Option<u64>,
        tokens: Option<TokenUsage>,
    ) {
        if total_cost_usd.is_some() {
            self.total_cost_usd = total_cost_usd;
        }
        if duration_ms.is_some() {
            self.reported_duration_ms = duration_ms;
        }
        if let Some(turns) = turns {
            self.turns = turns;
        }
        if let Some(tokens) = tokens {
            self.tokens = tokens;
        }
        self.refresh_duration();
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.success = false;
        self.error_message = Some(message.into());
    }

    fn refresh_duration(&mut self) {
        self.duration_ms = self.duration_ms();
    }
}
