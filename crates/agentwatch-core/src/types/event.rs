//! Observability events produced from an agent session.

use super::usage::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A typed, correlated record describing one session occurrence.
///
/// Serializes flat: the common header (`session_id`, `timestamp`, `raw`) sits
/// next to an `event_type` discriminator and only the fields of that kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityEvent {
    /// Session the event belongs to.
    pub session_id: String,

    /// When the event was produced.
    pub timestamp: DateTime<Utc>,

    /// Kind-specific fields.
    #[serde(flatten)]
    pub kind: EventKind,

    /// The original record, kept for audit and replay.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

/// Discriminated event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    /// The agent process initialized.
    SessionStarted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    /// The agent reported a terminal result.
    SessionCompleted {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        tool_usage: BTreeMap<String, u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },

    /// A tool call was issued.
    ToolExecutionStarted {
        tool_name: String,
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        tool_input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },

    /// A tool call returned.
    ToolExecutionCompleted {
        tool_name: String,
        tool_use_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },

    /// Token counters reported by one model response.
    TokenUsage { usage: TokenUsage },

    /// The agent reported an error.
    Error { error_message: String },

    /// A sub-agent was dispatched.
    SubagentStarted {
        subagent_name: String,
        subagent_tool_use_id: String,
        parent_tool_use_id: String,
    },

    /// A sub-agent returned to its dispatcher.
    SubagentStopped {
        subagent_name: String,
        subagent_tool_use_id: String,
        parent_tool_use_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
}

impl EventKind {
    /// The serialized discriminator for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::SessionCompleted { .. } => "session_completed",
            Self::ToolExecutionStarted { .. } => "tool_execution_started",
            Self::ToolExecutionCompleted { .. } => "tool_execution_completed",
            Self::TokenUsage { .. } => "token_usage",
            Self::Error { .. } => "error",
            Self::SubagentStarted { .. } => "subagent_started",
            Self::SubagentStopped { .. } => "subagent_stopped",
        }
    }
}

impl ObservabilityEvent {
    /// Create an event stamped with the current time.
    pub fn new(session_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            kind,
            raw: Value::Null,
        }
    }

    /// Attach the original record.
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// The event discriminator (`tool_execution_started`, ...).
    pub fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Tool name, for tool events.
    pub fn tool_name(&self) -> Option<&str> {
        match &self.kind {
            EventKind::ToolExecutionStarted { tool_name, .. }
            | EventKind::ToolExecutionCompleted { tool_name, .. } => Some(tool_name),
            _ => None,
        }
    }

    /// Tool call id, for tool and sub-agent events.
    pub fn tool_use_id(&self) -> Option<&str> {
        match &self.kind {
            EventKind::ToolExecutionStarted { tool_use_id, .. }
            | EventKind::ToolExecutionCompleted { tool_use_id, .. } => Some(tool_use_id),
            EventKind::SubagentStarted {
                subagent_tool_use_id,
                ..
            }
            | EventKind::SubagentStopped {
                subagent_tool_use_id,
                ..
            } => Some(subagent_tool_use_id),
            _ => None,
        }
    }

    /// Outcome flag, for kinds that carry one.
    pub fn success(&self) -> Option<bool> {
        match &self.kind {
            EventKind::SessionCompleted { success, .. }
            | EventKind::ToolExecutionCompleted { success, .. }
            | EventKind::SubagentStopped { success, .. } => Some(*success),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_irrelevant_fields_are_absent() {
        let event = ObservabilityEvent::new(
            "s1",
            EventKind::ToolExecutionCompleted {
                tool_name: "Bash".to_string(),
                tool_use_id: "t1".to_string(),
                success: true,
                parent_tool_use_id: None,
            },
        );

        let value = serde_json::to_value(&event).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj["event_type"], "tool_execution_completed");
        assert_eq!(obj["tool_name"], "Bash");
        assert!(!obj.contains_key("parent_tool_use_id"));
        assert!(!obj.contains_key("raw"));
        assert!(!obj.contains_key("error_message"));
        assert!(!obj.contains_key("usage"));
        assert!(!obj.contains_key("subagent_name"));
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let event = ObservabilityEvent::new(
            "s1",
            EventKind::SubagentStopped {
                subagent_name: "reviewer".to_string(),
                subagent_tool_use_id: "t9".to_string(),
                parent_tool_use_id: "t9".to_string(),
                success: true,
                duration_ms: Some(1500),
            },
        )
        .with_raw(json!({"type": "user"}));

        let json = serde_json::to_string(&event).unwrap();
        let parsed: ObservabilityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_accessors() {
        let event = ObservabilityEvent::new(
            "s1",
            EventKind::ToolExecutionStarted {
                tool_name: "Read".to_string(),
                tool_use_id: "t2".to_string(),
                tool_input: json!({"file_path": "a.rs"}),
                parent_tool_use_id: None,
            },
        );
        assert_eq!(event.event_type(), "tool_execution_started");
        assert_eq!(event.tool_name(), Some("Read"));
        assert_eq!(event.tool_use_id(), Some("t2"));
        assert_eq!(event.success(), None);
    }
}
