//! Allow-listed command execution with managed process lifecycles.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{HelmError, Result};

use super::allowlist::AllowlistConfig;
use super::registry::{ProcessInfo, ProcessRegistry, RunningProcess};
use super::spawner::{ProcessSpawner, ShellSpawner};

const READ_CHUNK: usize = 8 * 1024;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub allowlist: AllowlistConfig,
    /// Wall-clock limit for one process, measured from the start of the wait.
    #[serde(rename = "timeout_ms", with = "crate::util::retry::millis")]
    pub timeout: Duration,
    /// Bytes kept per output stream; the remainder is drained and dropped.
    pub max_output_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allowlist: AllowlistConfig::default(),
            timeout: Duration::from_secs(120),
            max_output_bytes: 1_000_000,
        }
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub pid: u32,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub truncated: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A spawned process whose exit has not been collected yet.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    instance: Uuid,
    exit: oneshot::Receiver<CommandOutput>,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Validates command lines against an allowlist and owns the processes it starts.
///
/// Each accepted line is registered right after spawn and deregistered exactly
/// once, either by its reaper task on exit or by [`terminate`](Self::terminate).
pub struct CommandExecutionEngine {
    config: EngineConfig,
    registry: ProcessRegistry,
    spawner: Arc<dyn ProcessSpawner>,
}

impl CommandExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_spawner(config, Arc::new(ShellSpawner))
    }

    pub fn with_spawner(config: EngineConfig, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            config,
            registry: ProcessRegistry::new(),
            spawner,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn validate(&self, command_line: &str) -> bool {
        self.config.allowlist.validate(command_line)
    }

    /// Start `command_line` without waiting for it.
    pub fn spawn(&self, command_line: &str, cwd: &Path) -> Result<ProcessHandle> {
        if !self.validate(command_line) {
            warn!(command = command_line, "command rejected by allowlist");
            return Err(HelmError::CommandNotAllowed(command_line.to_string()));
        }

        let mut child = self
            .spawner
            .spawn(&self.config.allowlist.shell, command_line, cwd)?;
        let Some(pid) = child.id() else {
            return Err(HelmError::Io(std::io::Error::other(
                "spawned process has no pid",
            )));
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let instance = Uuid::new_v4();
        self.registry.register(RunningProcess {
            pid,
            command_line: command_line.to_string(),
            started_at: Utc::now(),
            instance,
            stdin: Arc::new(tokio::sync::Mutex::new(child.stdin.take())),
        });
        info!(pid, command = command_line, cwd = %cwd.display(), "process started");

        let (tx, rx) = oneshot::channel();
        let registry = self.registry.clone();
        let cap = self.config.max_output_bytes;
        tokio::spawn(async move {
            let stdout_task = tokio::spawn(read_capped(stdout, cap));
            let stderr_task = tokio::spawn(read_capped(stderr, cap));

            let exit_code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(pid, error = %e, "failed to wait for process");
                    None
                }
            };
            if registry.deregister_instance(pid, instance) {
                debug!(pid, ?exit_code, "process exited");
            }

            let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
            let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();
            let _ = tx.send(CommandOutput {
                pid,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                exit_code,
                truncated: stdout_truncated || stderr_truncated,
            });
        });

        Ok(ProcessHandle {
            pid,
            instance,
            exit: rx,
        })
    }

    /// Wait for a spawned process, bounded by the configured timeout.
    ///
    /// On timeout the whole process group is signalled, including members that
    /// outlive the leader. Cancellation stops the wait but leaves the process
    /// running and registered.
    pub async fn wait(
        &self,
        mut handle: ProcessHandle,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        self.wait_for(&mut handle, cancel).await
    }

    /// Like [`wait`](Self::wait), but a canceled wait leaves `handle` usable
    /// for a later wait.
    pub async fn wait_for(
        &self,
        handle: &mut ProcessHandle,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        let pid = handle.pid;
        let timeout_ms = self.config.timeout.as_millis() as u64;
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(pid, "wait canceled; process left running");
                Err(HelmError::Canceled)
            }
            _ = tokio::time::sleep(self.config.timeout) => {
                warn!(pid, timeout_ms, "process timed out");
                if let Err(e) = signal_group(pid) {
                    warn!(pid, error = %e, "failed to signal process group after timeout");
                }
                self.registry.deregister_instance(pid, handle.instance);
                Err(HelmError::Timeout(timeout_ms))
            }
            exit = &mut handle.exit => exit.map_err(|_| {
                HelmError::Io(std::io::Error::other("process reaper exited without a result"))
            }),
        }
    }

    /// Validate, spawn and wait for `command_line` in `cwd`.
    pub async fn execute(
        &self,
        command_line: &str,
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        let handle = self.spawn(command_line, cwd)?;
        self.wait(handle, cancel).await
    }

    /// Write `text` plus a newline to the stdin of a registered process.
    pub async fn send_input(&self, pid: u32, text: &str) -> Result<()> {
        let process = self
            .registry
            .get(pid)
            .ok_or(HelmError::ProcessNotFound(pid))?;
        let mut stdin = process.stdin.lock().await;
        let pipe = stdin.as_mut().ok_or_else(|| {
            HelmError::InvalidArgument(format!("stdin of process {pid} is closed"))
        })?;
        pipe.write_all(format!("{text}\n").as_bytes()).await?;
        pipe.flush().await?;
        debug!(pid, bytes = text.len() + 1, "wrote to process stdin");
        Ok(())
    }

    /// Close the stdin of a registered process so it sees end of input.
    pub async fn close_input(&self, pid: u32) -> Result<()> {
        let process = self
            .registry
            .get(pid)
            .ok_or(HelmError::ProcessNotFound(pid))?;
        process.stdin.lock().await.take();
        Ok(())
    }

    /// Send SIGTERM to the process group of `pid` and deregister it.
    pub fn terminate(&self, pid: u32) -> Result<()> {
        let process = self
            .registry
            .get(pid)
            .ok_or(HelmError::ProcessNotFound(pid))?;
        signal_group(pid)?;
        self.registry.deregister_instance(pid, process.instance);
        info!(pid, command = %process.command_line, "process terminated");
        Ok(())
    }

    pub fn running(&self) -> Vec<ProcessInfo> {
        self.registry.snapshot()
    }

    pub fn is_running(&self, pid: u32) -> bool {
        self.registry.contains(pid)
    }
}

#[cfg(unix)]
fn signal_group(pid: u32) -> Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| HelmError::InvalidArgument(format!("pid {pid} out of range")))?;
    // SAFETY: killpg only sends a signal; it touches no memory we own.
    let rc = unsafe { libc::killpg(pgid, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err.into())
}

#[cfg(not(unix))]
fn signal_group(_pid: u32) -> Result<()> {
    Err(HelmError::UnsupportedOperation(
        "process group termination requires a unix platform".to_string(),
    ))
}

async fn read_capped<R>(reader: Option<R>, cap: usize) -> (Vec<u8>, bool)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    (kept, truncated)
}
