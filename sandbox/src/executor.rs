//! One-shot command execution (§4.1 "Run one-shot command"): used for every
//! non-Python language, and for Python when REPL state persistence is
//! disabled. Spawns the target via `spawn::spawn_isolated`, then waits with
//! the teacher's own timeout-then-SIGKILL-the-process-group discipline from
//! `consume_truncated_output` (`core/src/exec.rs`), adapted from a tokio
//! `select!`/`KillOnDrop` pair to a blocking `waitpid` poll loop since the
//! child here is a raw `clone()`d process rather than a `tokio::process::Child`.

use std::io::Read;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{instrument, warn};

use crate::error::{Result, SandboxError};
use crate::isolation::IsolationPlan;
use crate::spawn::{spawn_isolated, SpawnSpec};

const GRACE_PERIOD: Duration = Duration::from_secs(5);
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;
const TRUNCATION_SUFFIX: &str = "\n[Output truncated \u{2026}]";

pub struct OneShotOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Everything needed to fork, isolate, and exec a single command.
pub struct OneShotSpec {
    pub isolation: IsolationPlan,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
}

/// Blocking; callers run this on a `tokio::task::spawn_blocking` thread.
#[instrument(skip(spec), fields(program = %spec.program, timeout_ms = spec.timeout.as_millis() as u64))]
pub fn run_one_shot(spec: OneShotSpec) -> Result<OneShotOutcome> {
    let child = spawn_isolated(SpawnSpec {
        isolation: spec.isolation,
        program: spec.program,
        args: spec.args,
        env: spec.env,
    })?;

    if let Some(input) = &spec.stdin {
        let _ = write_all_best_effort(child.stdin.as_raw_fd(), input);
    }
    drop(child.stdin);

    let deadline = Instant::now() + spec.timeout + GRACE_PERIOD;
    let status = wait_with_deadline(child.pid, deadline)?;

    let stdout_raw = read_to_end(child.stdout);
    let stderr_raw = read_to_end(child.stderr);

    let (exit_code, timed_out) = match status {
        WaitOutcome::Exited(code) => (code, false),
        WaitOutcome::Signaled(_sig) => (128, false),
        WaitOutcome::TimedOut => (124, true),
    };

    Ok(OneShotOutcome {
        exit_code,
        stdout: sanitize_output(stdout_raw),
        stderr: sanitize_output(stderr_raw),
        timed_out,
    })
}

enum WaitOutcome {
    Exited(i32),
    Signaled(i32),
    TimedOut,
}

fn wait_with_deadline(pid: Pid, deadline: Instant) -> Result<WaitOutcome> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(WaitOutcome::Exited(code)),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(WaitOutcome::Signaled(sig as i32)),
            Ok(WaitStatus::StillAlive) => {
                if Instant::now() >= deadline {
                    warn!(pid = pid.as_raw(), "one-shot command exceeded its deadline; killing process group");
                    let _ = kill(Pid::from_raw(-pid.as_raw()), Signal::SIGKILL);
                    let _ = waitpid(pid, None);
                    return Ok(WaitOutcome::TimedOut);
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Ok(_) => std::thread::sleep(Duration::from_millis(20)),
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(SandboxError::Isolation(format!("waitpid: {e}"))),
        }
    }
}

fn write_all_best_effort(fd: std::os::fd::RawFd, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    let result = file.write_all(data);
    std::mem::forget(file);
    result
}

fn read_to_end(fd: OwnedFd) -> Vec<u8> {
    let mut file = unsafe { std::fs::File::from_raw_fd(fd.as_raw_fd()) };
    std::mem::forget(fd);
    let mut buf = Vec::new();
    let _ = file.read_to_end(&mut buf);
    buf
}

/// Decode UTF-8 lossily, strip C0/DEL control bytes except tab/newline, cap
/// at 1 MiB with a truncation suffix (§4.1).
fn sanitize_output(raw: Vec<u8>) -> String {
    let decoded = String::from_utf8_lossy(&raw);
    let cleaned: String = decoded
        .chars()
        .filter(|c| {
            let code = *c as u32;
            *c == '\t' || *c == '\n' || !(code < 0x20 || code == 0x7f)
        })
        .collect();

    if cleaned.len() <= MAX_OUTPUT_BYTES {
        return cleaned;
    }

    let mut cut = MAX_OUTPUT_BYTES;
    while !cleaned.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = cleaned[..cut].to_string();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_output_strips_control_bytes_but_keeps_tab_and_newline() {
        let raw = b"hello\tworld\n\x01\x07bye\x7f!".to_vec();
        let cleaned = sanitize_output(raw);
        assert_eq!(cleaned, "hello\tworld\nbye!");
    }

    #[test]
    fn sanitize_output_truncates_past_one_mebibyte() {
        let raw = vec![b'a'; MAX_OUTPUT_BYTES + 100];
        let cleaned = sanitize_output(raw);
        assert!(cleaned.starts_with(&"a".repeat(10)));
        assert!(cleaned.ends_with(TRUNCATION_SUFFIX));
        assert!(cleaned.len() < MAX_OUTPUT_BYTES + TRUNCATION_SUFFIX.len() + 10);
    }

    #[test]
    fn sanitize_output_passes_short_clean_text_through_unchanged() {
        let raw = b"exit status 0".to_vec();
        assert_eq!(sanitize_output(raw), "exit status 0");
    }
}
