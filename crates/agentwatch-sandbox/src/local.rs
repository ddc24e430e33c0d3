//! Host-directory workspaces.
//!
//! No isolation beyond a scrubbed environment and path scoping. Meant for
//! development and tests.

use crate::config::WorkspaceConfig;
use crate::error::SandboxError;
use crate::executor::{ProcessRunner, ProcessSpec};
use crate::provider::{ExecOptions, LineStream, WorkspaceProvider};
use crate::workspace::{ExecuteResult, Workspace};
use crate::Result;
use agentwatch_core::types::Backend;
use agentwatch_core::{env, id, paths};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// Workspaces as directories under a base directory.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    base_dir: PathBuf,
    runner: ProcessRunner,
}

impl LocalProvider {
    /// Create a provider rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            runner: ProcessRunner::new(),
        }
    }

    /// Create a provider rooted at `~/.agentwatch/workspaces`.
    pub fn with_default_dir() -> Result<Self> {
        Ok(Self::new(paths::workspaces_dir()?))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map a workspace path onto the host.
    ///
    /// Relative paths are joined to the root. Absolute paths under the
    /// configured working directory are re-rooted; other absolute paths are
    /// treated as root-relative.
    pub fn resolve(&self, workspace: &Workspace, path: &Path) -> Result<PathBuf> {
        let relative = path
            .strip_prefix(&workspace.config().working_dir)
            .unwrap_or(path);
        paths::join_within(workspace.root(), relative)
            .ok_or_else(|| SandboxError::PathEscape(path.to_path_buf()))
    }

    fn process_env(
        &self,
        workspace: &Workspace,
        extra: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let config = workspace.config();
        let mut vars = env::base_workspace_env();
        let mut requested: HashMap<String, String> = config
            .env()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        requested.extend(
            config
                .secrets()
                .iter()
                .map(|(k, v)| (k.clone(), v.expose_secret().to_string())),
        );
        requested.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.extend(env::filter_env(&requested));
        vars.insert(
            "AGENTWATCH_WORKSPACE".to_string(),
            workspace.root().display().to_string(),
        );
        vars
    }

    fn shell_spec(
        &self,
        workspace: &Workspace,
        command: &str,
        options: &ExecOptions,
    ) -> Result<ProcessSpec> {
        let cwd = match &options.cwd {
            Some(cwd) => self.resolve(workspace, cwd)?,
            None => workspace.root().to_path_buf(),
        };
        Ok(ProcessSpec::shell(command)
            .with_cwd(cwd)
            .with_clean_env()
            .with_envs(self.process_env(workspace, &options.env)))
    }

    async fn link_mounts(&self, root: &Path, config: &WorkspaceConfig) -> Result<()> {
        for mount in config.effective_mounts() {
            let relative = mount
                .target
                .strip_prefix(&config.working_dir)
                .unwrap_or(&mount.target);
            let link = paths::join_within(root, relative)
                .ok_or_else(|| SandboxError::PathEscape(mount.target.clone()))?;
            if let Some(parent) = link.parent() {
                fs::create_dir_all(parent).await?;
            }
            if mount.read_only {
                debug!(
                    target = %mount.target.display(),
                    "Read-only mounts are not enforced by the local backend"
                );
            }
            link_dir(&mount.source, &link)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn link_dir(source: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(source, link).map_err(|e| {
        SandboxError::creation(format!(
            "cannot mount {} at {}: {}",
            source.display(),
            link.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn link_dir(source: &Path, _link: &Path) -> Result<()> {
    Err(SandboxError::creation(format!(
        "mounts are not supported by the local backend on this platform: {}",
        source.display()
    )))
}

#[async_trait]
impl WorkspaceProvider for LocalProvider {
    fn name(&self) -> &'static str {
        Backend::Local.as_str()
    }

    async fn create(&self, config: WorkspaceConfig) -> Result<Workspace> {
        config.validate()?;

        for mount in config.effective_mounts() {
            if !fs::try_exists(&mount.source).await.unwrap_or(false) {
                return Err(SandboxError::creation(format!(
                    "mount source does not exist: {}",
                    mount.source.display()
                )));
            }
        }

        let id = id::workspace_id();
        let root = self.base_dir.join(&id);
        fs::create_dir_all(&root).await.map_err(|e| {
            SandboxError::creation(format!("cannot create {}: {}", root.display(), e))
        })?;

        if let Err(e) = self.link_mounts(&root, &config).await {
            let _ = fs::remove_dir_all(&root).await;
            return Err(e);
        }

        info!(workspace = %id, root = %root.display(), "Created local workspace");
        let handle = root.display().to_string();
        Ok(Workspace::new(id, Backend::Local, root, config, handle))
    }

    async fn destroy(&self, workspace: Workspace) {
        if !workspace.should_remove() {
            info!(
                workspace = %workspace.id(),
                root = %workspace.root().display(),
                "Keeping workspace per cleanup policy"
            );
            return;
        }
        match fs::remove_dir_all(workspace.root()).await {
            Ok(()) => debug!(workspace = %workspace.id(), "Removed local workspace"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(workspace = %workspace.id(), "Workspace already gone")
            }
            Err(e) => warn!(workspace = %workspace.id(), error = %e, "Failed to remove workspace"),
        }
    }

    async fn execute(
        &self,
        workspace: &Workspace,
        command: &str,
        options: ExecOptions,
    ) -> ExecuteResult {
        let timeout = options.effective_timeout(workspace);
        let result = match self.shell_spec(workspace, command, &options) {
            Ok(spec) => self.runner.run(&spec, timeout).await,
            Err(e) => ExecuteResult::launch_failure(e.to_string()),
        };
        workspace.observe(&result);
        debug!(
            workspace = %workspace.id(),
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            timed_out = result.timed_out,
            "Command finished"
        );
        result
    }

    async fn write_file(&self, workspace: &Workspace, path: &Path, content: &[u8]) -> Result<()> {
        let target = self.resolve(workspace, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, content).await?;
        Ok(())
    }

    async fn read_file(&self, workspace: &Workspace, path: &Path) -> Result<Vec<u8>> {
        let target = self.resolve(workspace, path)?;
        fs::read(&target).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => SandboxError::FileNotFound(path.to_path_buf()),
            _ => SandboxError::Io(e),
        })
    }

    async fn file_exists(&self, workspace: &Workspace, path: &Path) -> Result<bool> {
        let target = self.resolve(workspace, path)?;
        Ok(fs::try_exists(&target).await?)
    }

    fn stream(&self, workspace: &Workspace, command: &str) -> LineStream {
        let timeout = Duration::from_secs(workspace.config().limits.timeout_secs());
        match self.shell_spec(workspace, command, &ExecOptions::default()) {
            Ok(spec) => self.runner.stream(spec, timeout),
            Err(e) => {
                warn!(workspace = %workspace.id(), error = %e, "Cannot stream command");
                Box::pin(futures::stream::empty())
            }
        }
    }
}
