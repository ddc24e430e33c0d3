//! Workspace handles and execution results.

use crate::config::WorkspaceConfig;
use agentwatch_core::types::Backend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit code reported for a command killed by its timeout (coreutils `timeout` convention).
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when a command could not be launched at all.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

/// An isolated execution root created by a provider.
///
/// Owned exclusively by whoever called `create`; dropped into `destroy`
/// when done.
#[derive(Debug)]
pub struct Workspace {
    id: String,
    backend: Backend,
    root: PathBuf,
    config: WorkspaceConfig,
    created_at: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
    handle: String,
    errored: AtomicBool,
}

impl Workspace {
    /// Create a workspace record. `handle` is backend-private (a container id, a path).
    pub fn new(
        id: impl Into<String>,
        backend: Backend,
        root: impl Into<PathBuf>,
        config: WorkspaceConfig,
        handle: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            backend,
            root: root.into(),
            config,
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
            handle: handle.into(),
            errored: AtomicBool::new(false),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Execution root: a host directory (local) or the working directory inside the container.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Record that a command in this workspace failed.
    pub fn mark_errored(&self) {
        self.errored.store(true, Ordering::Relaxed);
    }

    /// Whether any command in this workspace failed.
    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::Relaxed)
    }

    /// Whether `destroy` should remove this workspace's state.
    pub fn should_remove(&self) -> bool {
        self.config.cleanup.should_remove(self.is_errored())
    }

    /// Fold a command result into the error flag.
    pub(crate) fn observe(&self, result: &ExecuteResult) {
        if !result.success() {
            self.mark_errored();
        }
    }
}

/// Outcome of a single command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Exit code: [`TIMEOUT_EXIT_CODE`] on timeout, [`LAUNCH_FAILURE_EXIT_CODE`] if never started.
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the command was killed by its timeout.
    pub timed_out: bool,
}

impl ExecuteResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// A result for a command that could not be launched.
    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self {
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: message.into(),
            duration_ms: 0,
            timed_out: false,
        }
    }
}
