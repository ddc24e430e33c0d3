//! Process execution with timeouts and process-tree termination.
//!
//! Both backends funnel every host process through [`ProcessRunner`]: the
//! local backend runs `/bin/sh -c <command>` directly, the container backend
//! runs the engine CLI. Launch failures and timeouts are folded into the
//! returned output instead of surfacing as errors.

use crate::provider::LineStream;
use crate::workspace::{ExecuteResult, LAUNCH_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};
use async_stream::stream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

/// Description of a host process to launch.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    /// Program to execute.
    pub program: String,

    /// Arguments.
    pub args: Vec<String>,

    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Environment variables added to the process.
    pub env: HashMap<String, String>,

    /// Start from an empty environment instead of inheriting the host's.
    pub clear_env: bool,

    /// Bytes written to stdin before it is closed.
    pub stdin: Option<Vec<u8>>,
}

impl ProcessSpec {
    /// Create a spec for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Create a spec that runs `command` through `/bin/sh -c`.
    pub fn shell(command: &str) -> Self {
        Self::new("/bin/sh").arg("-c").arg(command)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
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

    pub fn with_envs(mut self, vars: HashMap<String, String>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Drop the inherited host environment.
    pub fn with_clean_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    pub fn with_stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if self.clear_env {
            cmd.env_clear();
        }
        cmd.envs(&self.env);

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        // Own process group so a timeout can take down the whole tree.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

/// Byte-exact output of a finished process.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration_ms: u64,
    pub timed_out: bool,
    /// Output went past the runner's capture limit and was cut.
    pub truncated: bool,
}

impl RawOutput {
    fn launch_failure(message: String, started: Instant) -> Self {
        Self {
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            stdout: Vec::new(),
            stderr: message.into_bytes(),
            duration_ms: elapsed_ms(started),
            timed_out: false,
            truncated: false,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stderr as lossy UTF-8, trimmed.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

impl From<RawOutput> for ExecuteResult {
    fn from(raw: RawOutput) -> Self {
        ExecuteResult {
            exit_code: raw.exit_code,
            stdout: String::from_utf8_lossy(&raw.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
            duration_ms: raw.duration_ms,
            timed_out: raw.timed_out,
        }
    }
}

/// Runs host processes under a wall-clock timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Maximum bytes captured per output stream.
    max_output_size: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            max_output_size: 10 * 1024 * 1024, // 10 MB default
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner that captures output in full, for byte-exact transfers.
    pub fn unbounded() -> Self {
        Self {
            max_output_size: usize::MAX,
        }
    }

    /// Set maximum output size.
    pub fn with_max_output_size(mut self, size: usize) -> Self {
        self.max_output_size = size;
        self
    }

    /// Run a process to completion and capture its output as text.
    pub async fn run(&self, spec: &ProcessSpec, timeout: Duration) -> ExecuteResult {
        self.run_raw(spec, timeout).await.into()
    }

    /// Run a process to completion and capture its output byte-exact.
    ///
    /// On timeout the whole process group is killed and the result carries
    /// [`TIMEOUT_EXIT_CODE`] with `timed_out` set.
    pub async fn run_raw(&self, spec: &ProcessSpec, timeout: Duration) -> RawOutput {
        let started = Instant::now();
        debug!(program = %spec.program, timeout_secs = timeout.as_secs(), "Running process");

        let mut child = match spec.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %spec.program, error = %e, "Failed to spawn process");
                return RawOutput::launch_failure(
                    format!("Failed to spawn {}: {}", spec.program, e),
                    started,
                );
            }
        };

        if let (Some(input), Some(mut stdin)) = (spec.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(error = %e, "Failed writing process stdin");
                }
                // stdin dropped here, closing the pipe
            });
        }

        // One deadline covers the wait and both pipes, since background
        // children can hold the pipes open after the direct child exits.
        let pid = child.id();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let max = self.max_output_size;

        let collect = async {
            let (status, stdout_cut, stderr_cut) = tokio::join!(
                async {
                    let status = child.wait().await;
                    kill_group(pid);
                    status
                },
                read_stream(stdout_pipe, max, &mut stdout),
                read_stream(stderr_pipe, max, &mut stderr),
            );
            (status, stdout_cut || stderr_cut)
        };
        let outcome = tokio::time::timeout(timeout, collect).await;

        let (exit_code, timed_out, truncated) = match outcome {
            Ok((Ok(status), truncated)) => (exit_code_of(status), false, truncated),
            Ok((Err(e), truncated)) => {
                stderr.extend_from_slice(format!("Failed to wait for process: {}", e).as_bytes());
                (LAUNCH_FAILURE_EXIT_CODE, false, truncated)
            }
            Err(_) => {
                warn!(
                    program = %spec.program,
                    timeout_secs = timeout.as_secs(),
                    "Process timed out, killing process group"
                );
                kill_tree(&mut child).await;
                stderr.extend_from_slice(
                    format!("Command timed out after {} seconds", timeout.as_secs()).as_bytes(),
                );
                (TIMEOUT_EXIT_CODE, true, false)
            }
        };

        RawOutput {
            exit_code,
            stdout,
            stderr,
            duration_ms: elapsed_ms(started),
            timed_out,
            truncated,
        }
    }

    /// Spawn a process and yield its stdout line by line as it runs.
    ///
    /// Stderr is drained separately and never interleaved. The sequence ends
    /// when the process closes stdout, or when `timeout` elapses, in which
    /// case the process group is killed.
    pub fn stream(&self, spec: ProcessSpec, timeout: Duration) -> LineStream {
        Box::pin(stream! {
            let mut child = match spec.command().spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!(program = %spec.program, error = %e, "Failed to spawn streamed process");
                    return;
                }
            };

            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(drain_stderr(stderr));
            }
            let Some(stdout) = child.stdout.take() else {
                return;
            };

            let deadline = tokio::time::Instant::now() + timeout;
            let mut reader = BufReader::new(stdout);
            loop {
                let mut buf = Vec::new();
                match tokio::time::timeout_at(deadline, reader.read_until(b'\n', &mut buf)).await {
                    Ok(Ok(0)) => break,
                    Ok(Ok(_)) => {
                        if buf.last() == Some(&b'\n') {
                            buf.pop();
                        }
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                        yield String::from_utf8_lossy(&buf).into_owned();
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Error reading process output");
                        break;
                    }
                    Err(_) => {
                        warn!(
                            program = %spec.program,
                            timeout_secs = timeout.as_secs(),
                            "Streamed process timed out, killing process group"
                        );
                        kill_tree(&mut child).await;
                        break;
                    }
                }
            }

            // Stdout can close while the process keeps running.
            let pid = child.id();
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => {
                    kill_group(pid);
                    debug!(exit_code = exit_code_of(status), "Streamed process exited");
                }
                Ok(Err(e)) => warn!(error = %e, "Failed to wait for streamed process"),
                Err(_) => {
                    warn!(
                        program = %spec.program,
                        "Streamed process outlived its timeout, killing process group"
                    );
                    kill_tree(&mut child).await;
                }
            }
        })
    }
}

/// SIGKILL every process left in the group led by `pid`.
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            trace!(pid, error = %e, "killpg found nothing to kill");
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Kill the child's process group, then the child itself.
async fn kill_tree(child: &mut Child) {
    kill_group(child.id());
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Child already gone");
    }
}

/// Exit code, or `128 + signal` for signal-terminated processes.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    LAUNCH_FAILURE_EXIT_CODE
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Read a pipe into `output`, keeping at most `max_size` bytes.
///
/// Returns true when the output was cut.
async fn read_stream(
    handle: Option<impl AsyncRead + Unpin>,
    max_size: usize,
    output: &mut Vec<u8>,
) -> bool {
    let Some(handle) = handle else {
        return false;
    };
    let mut limited = handle.take((max_size as u64).saturating_add(1));
    if let Err(e) = limited.read_to_end(output).await {
        warn!("Error reading stream: {}", e);
    }
    if output.len() <= max_size {
        return false;
    }
    output.truncate(max_size);
    output.extend_from_slice(b"\n[Output truncated]\n");
    // Keep draining so the writer never blocks on a full pipe.
    let mut rest = limited.into_inner();
    let _ = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await;
    true
}

async fn drain_stderr(stderr: impl AsyncRead + Unpin) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        trace!(line = %line, "stderr");
    }
}
