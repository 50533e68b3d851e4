use std::time::Duration;

use cellbox_protocol::SandboxId;
use cellbox_sandbox::{spawn_isolated, IsolationPlan, SpawnSpec};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::error::{ReplError, Result};
use crate::pipe::{AsyncPipeReader, AsyncPipeWriter};

/// A running REPL process inside a sandbox, plus the stdio plumbing needed
/// to speak the framed request/response protocol (§4.3). Mirrors the role
/// of the teacher's `KillOnDrop`-guarded `tokio::process::Child` in
/// `core/src/exec.rs`, adapted to the raw `clone()`d process this workspace
/// spawns for isolation instead of `tokio::process::Command`.
pub struct ReplHandle {
    pub sandbox_id: SandboxId,
    pid: Pid,
    stdin: AsyncPipeWriter,
    stdout: AsyncPipeReader,
    carry: Vec<u8>,
    stderr_drain: tokio::task::JoinHandle<()>,
    ready: bool,
    /// Set once a request/response round-trip misses its deadline: the pool
    /// must destroy (never reuse) a handle in this state (§4.3).
    stale: bool,
}

impl ReplHandle {
    /// Forks the REPL driver (`python3 /opt/repl_server.py`) inside the
    /// isolation plan's namespaces and waits for its startup "ready" frame
    /// (§4.3). Spawning/Startup are split into two steps (`spawn` then
    /// `wait_ready`) so the pool can apply its own warmup timeout around
    /// the second half only.
    #[instrument(skip(isolation, env), fields(sandbox_id = %sandbox_id))]
    pub fn spawn(
        sandbox_id: SandboxId,
        isolation: IsolationPlan,
        env: Vec<(String, String)>,
    ) -> Result<Self> {
        let spawned = spawn_isolated(SpawnSpec {
            isolation,
            program: "python3".to_string(),
            args: vec![crate::REPL_DRIVER_PATH.to_string()],
            env,
        })?;

        let stdin = AsyncPipeWriter::new(spawned.stdin)?;
        let stdout = AsyncPipeReader::new(spawned.stdout)?;
        let mut stderr = AsyncPipeReader::new(spawned.stderr)?;

        let drain_sandbox_id = sandbox_id;
        let stderr_drain = tokio::spawn(async move {
            let mut buf = Vec::new();
            loop {
                match stderr.read_some(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&buf);
                        warn!(sandbox_id = %drain_sandbox_id, "repl stderr: {}", text.trim_end());
                        buf.clear();
                    }
                }
            }
        });

        Ok(Self {
            sandbox_id,
            pid: spawned.pid,
            stdin,
            stdout,
            carry: Vec::new(),
            stderr_drain,
            ready: false,
            stale: false,
        })
    }

    /// Reads frames from stdout until the startup `{"status":"ready"}`
    /// frame arrives, or `warmup_timeout` elapses (§4.3).
    #[instrument(skip(self), fields(sandbox_id = %self.sandbox_id))]
    pub async fn wait_ready(&mut self, warmup_timeout: Duration) -> Result<()> {
        let body = timeout(warmup_timeout, self.stdout.read_frame(&mut self.carry))
            .await
            .map_err(|_| ReplError::StartupTimeout(warmup_timeout))?
            .map_err(ReplError::Io)?
            .ok_or(ReplError::Dead)?;

        match cellbox_protocol::repl::ReplFrame::decode(&body)? {
            cellbox_protocol::repl::ReplFrame::Ready => {
                self.ready = true;
                Ok(())
            }
            cellbox_protocol::repl::ReplFrame::Completed(_) => Err(ReplError::NotReady),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Non-blocking liveness check: `waitpid(WNOHANG)` without reaping past
    /// a terminal state (§3 "the queue never holds a descriptor whose REPL
    /// process has exited").
    pub fn is_alive(&self) -> bool {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            _ => false,
        }
    }

    pub(crate) async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.stdin.write_all(bytes).await.map_err(ReplError::Io)
    }

    pub(crate) async fn read_one_frame(&mut self) -> Result<Option<Vec<u8>>> {
        self.stdout
            .read_frame(&mut self.carry)
            .await
            .map_err(ReplError::Io)
    }

    /// Best-effort kill of the whole process group, then reap (§4.4
    /// `destroy_sandbox`: "kill the REPL process (best effort)").
    pub fn kill(&mut self) {
        self.stderr_drain.abort();
        let _ = kill(Pid::from_raw(-self.pid.as_raw()), Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
    }
}

impl Drop for ReplHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            self.kill();
        }
    }
}
