//! Container-backed workspaces driven through the engine CLI.
//!
//! One workspace is one long-running container. Commands run through
//! `<engine> exec`, files move through `cat` over stdin/stdout so reads and
//! writes stay byte-exact.

use crate::config::WorkspaceConfig;
use crate::error::SandboxError;
use crate::executor::{ProcessRunner, ProcessSpec, RawOutput};
use crate::provider::{ExecOptions, LineStream, WorkspaceProvider};
use crate::workspace::{ExecuteResult, Workspace, TIMEOUT_EXIT_CODE};
use crate::Result;
use agentwatch_core::env::{self, vars};
use agentwatch_core::types::{Backend, SecurityProfile};
use agentwatch_core::{id, paths};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Engine binary used when `AGENTWATCH_CONTAINER_ENGINE` is unset.
pub const DEFAULT_ENGINE: &str = "docker";

/// Hardened runtime name passed to `--runtime`.
pub const HARDENED_RUNTIME: &str = "runsc";

/// Home directory inside the container, backed by tmpfs.
pub const CONTAINER_HOME: &str = "/root";

/// Timeout for engine housekeeping calls (create, rm, file I/O).
const ENGINE_TIMEOUT: Duration = Duration::from_secs(60);

/// Extra time the engine client gets beyond the in-container timeout.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Exit status of `timeout -k` when it had to escalate to SIGKILL.
const KILLED_EXIT_CODE: i32 = 137;

/// Seconds `timeout -k` waits after SIGTERM before it sends SIGKILL.
const KILL_AFTER_SECS: &str = "2";

/// Workspaces as containers.
#[derive(Debug)]
pub struct ContainerProvider {
    engine: String,
    runner: ProcessRunner,
    /// Engine calls whose output is file content, captured in full.
    transfer: ProcessRunner,
    hardened_runtime: OnceCell<bool>,
}

impl Default for ContainerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerProvider {
    /// Create a provider using the engine named by `AGENTWATCH_CONTAINER_ENGINE`,
    /// or `docker`.
    pub fn new() -> Self {
        Self::with_engine(env::get_var_or(
            vars::AGENTWATCH_CONTAINER_ENGINE,
            DEFAULT_ENGINE,
        ))
    }

    /// Create a provider driving a specific engine binary (`docker`, `podman`).
    pub fn with_engine(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            runner: ProcessRunner::new(),
            transfer: ProcessRunner::unbounded(),
            hardened_runtime: OnceCell::new(),
        }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Whether the engine has the hardened runtime registered. Probed once.
    pub async fn detect_hardened_runtime(&self) -> bool {
        *self
            .hardened_runtime
            .get_or_init(|| async {
                let spec = ProcessSpec::new(&self.engine)
                    .args(["info", "--format", "{{json .Runtimes}}"]);
                let output = self.runner.run_raw(&spec, ENGINE_TIMEOUT).await;
                let found =
                    output.success() && runtimes_include(&output.stdout, HARDENED_RUNTIME);
                debug!(engine = %self.engine, found, "Probed for hardened runtime");
                found
            })
            .await
    }

    async fn use_hardened_runtime(&self, profile: &SecurityProfile) -> bool {
        match profile.hardened_runtime {
            Some(enabled) => enabled,
            None => self.detect_hardened_runtime().await,
        }
    }

    /// Resolve a workspace path to an absolute path inside the container.
    pub fn resolve(&self, workspace: &Workspace, path: &Path) -> Result<PathBuf> {
        let (base, relative) = if path.is_absolute() {
            (Path::new("/"), path)
        } else {
            (workspace.root(), path)
        };
        paths::join_within(base, relative)
            .ok_or_else(|| SandboxError::PathEscape(path.to_path_buf()))
    }

    async fn engine_call(&self, args: Vec<String>, stdin: Option<Vec<u8>>) -> RawOutput {
        let mut spec = ProcessSpec::new(&self.engine).args(args);
        if let Some(input) = stdin {
            spec = spec.with_stdin(input);
        }
        self.transfer.run_raw(&spec, ENGINE_TIMEOUT).await
    }

    fn exec_args(
        &self,
        workspace: &Workspace,
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if let Some(cwd) = cwd {
            args.push("-w".to_string());
            args.push(cwd.display().to_string());
        }
        let mut keys: Vec<&String> = env.keys().collect();
        keys.sort();
        for key in keys {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, env[key]));
        }
        args.push(workspace.handle().to_string());
        args
    }
}

/// Build the `run` arguments for a workspace container.
///
/// Security flags come first in a fixed order: capability drop,
/// no-new-privileges, read-only root, tmpfs for `/tmp` and home, process
/// limit, hardened runtime. New flags are appended after them. Secret values
/// never appear here; each secret is passed as a bare `-e KEY` and the value
/// travels through the engine client's environment.
pub fn docker_run_args(
    name: &str,
    config: &WorkspaceConfig,
    hardened_runtime: bool,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["run".into(), "-d".into(), "--name".into(), name.into()];
    let security = &config.security;

    if security.drop_capabilities {
        args.extend(["--cap-drop".into(), "ALL".into()]);
    }
    if security.no_new_privileges {
        args.extend(["--security-opt".into(), "no-new-privileges".into()]);
    }
    if security.read_only_root {
        args.push("--read-only".into());
    }
    if security.tmpfs_tmp {
        args.extend(["--tmpfs".into(), "/tmp:rw,nosuid,nodev".into()]);
    }
    if security.tmpfs_home {
        args.extend(["--tmpfs".into(), format!("{}:rw,nosuid,nodev", CONTAINER_HOME)]);
    }
    if let Some(pids) = security.pids_limit {
        args.extend(["--pids-limit".into(), pids.to_string()]);
    }
    if hardened_runtime {
        args.extend(["--runtime".into(), HARDENED_RUNTIME.into()]);
    }

    let limits = &config.limits;
    args.extend(["--cpus".into(), limits.cpus()]);
    args.extend(["--memory".into(), format!("{}m", limits.memory_mb())]);
    if let Some(disk) = limits.disk_mb() {
        args.extend(["--storage-opt".into(), format!("size={}m", disk)]);
    }
    if !limits.network_enabled() {
        args.extend(["--network".into(), "none".into()]);
    }

    args.extend(["-w".into(), config.working_dir.display().to_string()]);
    for mount in config.effective_mounts() {
        let mut volume = format!("{}:{}", mount.source.display(), mount.target.display());
        if mount.read_only {
            volume.push_str(":ro");
        }
        args.extend(["-v".into(), volume]);
    }

    args.extend(["-e".into(), format!("HOME={}", CONTAINER_HOME)]);
    for (key, value) in config.env().iter().filter(|(k, _)| !env::is_env_var_blocked(k)) {
        args.extend(["-e".into(), format!("{}={}", key, value)]);
    }
    for key in config.secrets().keys() {
        args.extend(["-e".into(), key.clone()]);
    }

    args.extend(["--label".into(), "agentwatch.workspace=true".into()]);
    for (key, value) in config.labels() {
        args.extend(["--label".into(), format!("{}={}", key, value)]);
    }

    // Image last, then a command that keeps the container alive.
    if let Some(image) = &config.image {
        args.push(image.clone());
    }
    args.extend(["sleep".into(), "infinity".into()]);
    args
}

/// Whether `docker info` runtime JSON names `runtime`.
fn runtimes_include(json: &[u8], runtime: &str) -> bool {
    serde_json::from_slice::<serde_json::Value>(json)
        .ok()
        .and_then(|v| v.as_object().map(|o| o.contains_key(runtime)))
        .unwrap_or(false)
}

#[async_trait]
impl WorkspaceProvider for ContainerProvider {
    fn name(&self) -> &'static str {
        Backend::Container.as_str()
    }

    async fn create(&self, config: WorkspaceConfig) -> Result<Workspace> {
        config.validate()?;

        for mount in config.effective_mounts() {
            if !tokio::fs::try_exists(&mount.source).await.unwrap_or(false) {
                return Err(SandboxError::creation(format!(
                    "mount source does not exist: {}",
                    mount.source.display()
                )));
            }
        }

        let id = id::workspace_id();
        let name = format!("agentwatch-{}", id);
        let hardened = self.use_hardened_runtime(&config.security).await;
        let args = docker_run_args(&name, &config, hardened);

        let secrets: HashMap<String, String> = config
            .secrets()
            .iter()
            .map(|(k, v)| (k.clone(), v.expose_secret().to_string()))
            .collect();
        let spec = ProcessSpec::new(&self.engine).args(args).with_envs(secrets);
        let output = self.runner.run_raw(&spec, ENGINE_TIMEOUT).await;
        if !output.success() {
            return Err(SandboxError::creation(format!(
                "{} run failed ({}): {}",
                self.engine,
                output.exit_code,
                output.stderr_text()
            )));
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if container_id.is_empty() {
            return Err(SandboxError::creation(format!(
                "{} run returned no container id",
                self.engine
            )));
        }

        info!(
            workspace = %id,
            container = %container_id,
            hardened_runtime = hardened,
            "Created container workspace"
        );
        let root = config.working_dir.clone();
        Ok(Workspace::new(id, Backend::Container, root, config, container_id)
            .with_metadata("container_name", name)
            .with_metadata("engine", self.engine.clone()))
    }

    async fn destroy(&self, workspace: Workspace) {
        if !workspace.should_remove() {
            info!(
                workspace = %workspace.id(),
                container = %workspace.handle(),
                "Keeping container per cleanup policy"
            );
            return;
        }
        let output = self
            .engine_call(vec!["rm".into(), "-f".into(), workspace.handle().into()], None)
            .await;
        if output.success() {
            debug!(workspace = %workspace.id(), "Removed container");
        } else {
            debug!(
                workspace = %workspace.id(),
                error = %output.stderr_text(),
                "Container removal failed, assuming it is gone"
            );
        }
    }

    async fn execute(
        &self,
        workspace: &Workspace,
        command: &str,
        options: ExecOptions,
    ) -> ExecuteResult {
        let timeout = options.effective_timeout(workspace);
        let cwd = match options
            .cwd
            .as_deref()
            .map(|p| self.resolve(workspace, p))
            .transpose()
        {
            Ok(cwd) => cwd,
            Err(e) => {
                let result = ExecuteResult::launch_failure(e.to_string());
                workspace.observe(&result);
                return result;
            }
        };

        // The in-container timeout kills the process tree; the client-side
        // timeout is a backstop for a wedged engine.
        let env = env::filter_env(&options.env);
        let mut args = self.exec_args(workspace, cwd.as_deref(), &env);
        args.extend(bounded_shell(command, timeout));
        let spec = ProcessSpec::new(&self.engine).args(args);
        let mut result: ExecuteResult = self
            .runner
            .run_raw(&spec, timeout + KILL_GRACE)
            .await
            .into();

        if !result.timed_out
            && (result.exit_code == TIMEOUT_EXIT_CODE
                || (result.exit_code == KILLED_EXIT_CODE
                    && Duration::from_millis(result.duration_ms) >= timeout))
        {
            result.timed_out = true;
            result.exit_code = TIMEOUT_EXIT_CODE;
        }
        workspace.observe(&result);
        result
    }

    async fn write_file(&self, workspace: &Workspace, path: &Path, content: &[u8]) -> Result<()> {
        let target = self.resolve(workspace, path)?;
        let mut args = vec![
            "exec".to_string(),
            "-i".to_string(),
            workspace.handle().to_string(),
        ];
        args.extend(
            [
                "/bin/sh",
                "-c",
                "mkdir -p \"$(dirname \"$1\")\" && cat > \"$1\"",
                "sh",
            ]
            .into_iter()
            .map(String::from),
        );
        args.push(target.display().to_string());

        let output = self.engine_call(args, Some(content.to_vec())).await;
        if output.success() {
            Ok(())
        } else {
            Err(SandboxError::backend(format!(
                "write {} failed: {}",
                target.display(),
                output.stderr_text()
            )))
        }
    }

    async fn read_file(&self, workspace: &Workspace, path: &Path) -> Result<Vec<u8>> {
        let target = self.resolve(workspace, path)?;
        let args = vec![
            "exec".to_string(),
            workspace.handle().to_string(),
            "cat".to_string(),
            "--".to_string(),
            target.display().to_string(),
        ];
        let output = self.engine_call(args, None).await;
        if output.success() {
            if output.truncated {
                return Err(SandboxError::backend(format!(
                    "read {} exceeded the capture limit",
                    target.display()
                )));
            }
            return Ok(output.stdout);
        }
        if !self.file_exists(workspace, path).await? {
            return Err(SandboxError::FileNotFound(path.to_path_buf()));
        }
        Err(SandboxError::backend(format!(
            "read {} failed: {}",
            target.display(),
            output.stderr_text()
        )))
    }

    async fn file_exists(&self, workspace: &Workspace, path: &Path) -> Result<bool> {
        let target = self.resolve(workspace, path)?;
        let args = vec![
            "exec".to_string(),
            workspace.handle().to_string(),
            "test".to_string(),
            "-e".to_string(),
            target.display().to_string(),
        ];
        let output = self.engine_call(args, None).await;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(SandboxError::backend(format!(
                "{} exec failed ({}): {}",
                self.engine,
                code,
                output.stderr_text()
            ))),
        }
    }

    fn stream(&self, workspace: &Workspace, command: &str) -> LineStream {
        let timeout = Duration::from_secs(workspace.config().limits.timeout_secs());
        let mut args = self.exec_args(workspace, None, &HashMap::new());
        args.extend(bounded_shell(command, timeout));
        self.runner
            .stream(ProcessSpec::new(&self.engine).args(args), timeout + KILL_GRACE)
    }
}

/// `/bin/sh -c command` under an in-container `timeout -k`, so the process
/// tree inside the container dies even when only the engine client is killed.
fn bounded_shell(command: &str, timeout: Duration) -> Vec<String> {
    let secs = timeout.as_secs().max(1).to_string();
    [
        "timeout",
        "-k",
        KILL_AFTER_SECS,
        secs.as_str(),
        "/bin/sh",
        "-c",
        command,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
