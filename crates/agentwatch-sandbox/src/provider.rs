//! The workspace provider contract.

use crate::config::WorkspaceConfig;
use crate::container::ContainerProvider;
use crate::local::LocalProvider;
use crate::workspace::{ExecuteResult, Workspace};
use crate::Result;
use agentwatch_core::types::Backend;
use agentwatch_core::Config;
use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Lines of stdout from a streamed command, in order.
pub type LineStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Per-call overrides for [`WorkspaceProvider::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Falls back to the workspace's `ExecutionLimits` timeout.
    pub timeout: Option<Duration>,

    /// Working directory, resolved inside the workspace.
    pub cwd: Option<PathBuf>,

    /// Extra environment variables for this call only.
    pub env: HashMap<String, String>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The timeout to apply for `workspace`.
    pub fn effective_timeout(&self, workspace: &Workspace) -> Duration {
        self.timeout
            .unwrap_or_else(|| Duration::from_secs(workspace.config().limits.timeout_secs()))
    }
}

/// A backend that creates isolated workspaces and runs commands in them.
///
/// Command failures, including timeouts and launch failures, come back as an
/// [`ExecuteResult`]; only creation and file operations return errors.
/// Different workspaces never block each other; concurrent calls on the same
/// workspace are not serialized.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Backend name.
    fn name(&self) -> &'static str;

    /// Allocate a workspace.
    async fn create(&self, config: WorkspaceConfig) -> Result<Workspace>;

    /// Tear a workspace down. Never fails, even if it is already gone.
    async fn destroy(&self, workspace: Workspace);

    /// Run a shell command to completion.
    async fn execute(&self, workspace: &Workspace, command: &str, options: ExecOptions)
        -> ExecuteResult;

    /// Write a file, creating parent directories.
    async fn write_file(&self, workspace: &Workspace, path: &Path, content: &[u8]) -> Result<()>;

    /// Read a file byte-exact.
    ///
    /// Missing files yield [`SandboxError::FileNotFound`](crate::SandboxError::FileNotFound).
    async fn read_file(&self, workspace: &Workspace, path: &Path) -> Result<Vec<u8>>;

    /// Check whether a path exists.
    async fn file_exists(&self, workspace: &Workspace, path: &Path) -> Result<bool>;

    /// Run a shell command and yield its stdout lines as they are produced.
    fn stream(&self, workspace: &Workspace, command: &str) -> LineStream;
}

/// Select a provider for `backend`, configured from `config`.
pub fn provider_for(backend: Backend, config: &Config) -> Result<Arc<dyn WorkspaceProvider>> {
    Ok(match backend {
        Backend::Local => {
            let provider = match &config.workspace.base_dir {
                Some(dir) => LocalProvider::new(dir.clone()),
                None => LocalProvider::with_default_dir()?,
            };
            Arc::new(provider)
        }
        Backend::Container => Arc::new(ContainerProvider::new()),
    })
}
