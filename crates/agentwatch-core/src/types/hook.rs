//! Hook events: the unit the event buffer batches and delivers.

use super::event::ObservabilityEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Kind of hook event.
///
/// Known lifecycle points get a variant; anything else travels as
/// [`Custom`](Self::Custom). Serializes as the plain string name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum HookEventType {
    SessionStart,
    SessionEnd,
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    Notification,
    Stop,
    SubagentStop,
    PreCompact,
    /// Any other event name, including observability event tags.
    Custom(String),
}

impl HookEventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionStart => "SessionStart",
            Self::SessionEnd => "SessionEnd",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::Notification => "Notification",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::PreCompact => "PreCompact",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for HookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "SessionStart" => Self::SessionStart,
            "SessionEnd" => Self::SessionEnd,
            "UserPromptSubmit" => Self::UserPromptSubmit,
            "PreToolUse" => Self::PreToolUse,
            "PostToolUse" => Self::PostToolUse,
            "Notification" => Self::Notification,
            "Stop" => Self::Stop,
            "SubagentStop" => Self::SubagentStop,
            "PreCompact" => Self::PreCompact,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl From<String> for HookEventType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }
}

impl From<HookEventType> for String {
    fn from(t: HookEventType) -> Self {
        t.as_str().to_string()
    }
}

/// One event handed to the buffer by a producer.
///
/// Identity is the generated `event_id`; two events compare equal only if
/// they are the same event. The timestamp is fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    event_id: String,
    event_type: HookEventType,
    session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    workflow_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    phase_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    milestone_id: Option<String>,

    #[serde(default)]
    data: Map<String, Value>,

    timestamp: DateTime<Utc>,
}

impl HookEvent {
    /// Create a new event with a fresh id and the current UTC time.
    pub fn new(event_type: HookEventType, session_id: impl Into<String>) -> Self {
        Self {
            event_id: crate::id::uuid(),
            event_type,
            session_id: session_id.into(),
            workflow_id: None,
            phase_id: None,
            milestone_id: None,
            data: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_phase(mut self, phase_id: impl Into<String>) -> Self {
        self.phase_id = Some(phase_id.into());
        self
    }

    pub fn with_milestone(mut self, milestone_id: impl Into<String>) -> Self {
        self.milestone_id = Some(milestone_id.into());
        self
    }

    /// Add one data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Replace the data payload. Non-object values are stored under `"value"`.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.data = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &HookEventType {
        &self.event_type
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    pub fn phase_id(&self) -> Option<&str> {
        self.phase_id.as_deref()
    }

    pub fn milestone_id(&self) -> Option<&str> {
        self.milestone_id.as_deref()
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl PartialEq for HookEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for HookEvent {}

impl Hash for HookEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.event_id.hash(state);
    }
}

impl From<&ObservabilityEvent> for HookEvent {
    fn from(event: &ObservabilityEvent) -> Self {
        let payload = serde_json::to_value(event).unwrap_or(Value::Null);
        let mut hook = HookEvent::new(
            HookEventType::Custom(event.event_type().to_string()),
            event.session_id.clone(),
        )
        .with_payload(payload);
        hook.timestamp = event.timestamp;
        hook
    }
}
