//! Configuration schema definitions.

use crate::types::{Backend, CleanupPolicy, ExecutionLimits, MountSpec, SecuritySetting};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main AgentWatch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Workspace defaults.
    #[serde(default)]
    pub workspace: WorkspaceSettings,

    /// Event delivery settings.
    #[serde(default)]
    pub telemetry: TelemetrySettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workspace configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    /// Isolation backend.
    #[serde(default)]
    pub backend: Backend,

    /// Container image (container backend only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Working directory inside the workspace.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Root for local workspaces. Defaults to `~/.agentwatch/workspaces`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    #[serde(default)]
    pub limits: ExecutionLimits,

    #[serde(default)]
    pub security: SecuritySetting,

    #[serde(default)]
    pub cleanup: CleanupPolicy,

    /// Mounts applied to every workspace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<MountSpec>,

    /// Plain environment variables applied to every workspace.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Labels attached to every workspace.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("/workspace")
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            image: None,
            working_dir: default_working_dir(),
            base_dir: None,
            limits: ExecutionLimits::default(),
            security: SecuritySetting::default(),
            cleanup: CleanupPolicy::default(),
            mounts: Vec::new(),
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }
}

/// Event delivery configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// Events per batch; reaching it triggers an immediate flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds between time-based flushes.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: f64,

    /// Queue capacity before the oldest events are evicted.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,

    /// Delivery attempts per batch before it is discarded.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Pause between delivery attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub sink: SinkSettings,
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval() -> f64 {
    5.0
}

fn default_max_buffer_size() -> usize {
    10_000
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval(),
            max_buffer_size: default_max_buffer_size(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            sink: SinkSettings::default(),
        }
    }
}

/// Where flushed batches go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkSettings {
    /// Append newline-delimited records to a file.
    File {
        /// Defaults to `~/.agentwatch/events/events.jsonl`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    /// POST each batch as a JSON array.
    Http {
        endpoint: String,
        #[serde(default = "default_http_timeout")]
        timeout_secs: u64,
    },
    /// Discard everything.
    #[default]
    None,
}

fn default_http_timeout() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
