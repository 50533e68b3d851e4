//! Low-level "clone, isolate, exec, don't wait" primitive shared by the
//! one-shot executor (`executor::run_one_shot`, which waits to completion)
//! and `cellbox-repl` (which keeps the pipes open across many request/response
//! cycles instead of waiting for exit). Pulling this out avoids duplicating
//! the `nix::sched::clone` dance in two crates.

use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd};

use nix::unistd::Pid;

use crate::error::{Result, SandboxError};
use crate::isolation::IsolationPlan;

pub struct SpawnSpec {
    pub isolation: IsolationPlan,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

pub struct SpawnedChild {
    pub pid: Pid,
    pub stdin: OwnedFd,
    pub stdout: OwnedFd,
    pub stderr: OwnedFd,
}

/// Forks a child into fresh PID/mount/UTS/IPC(/net) namespaces, applies the
/// isolation plan, and execs `program`. Returns immediately once the child
/// is running; the caller owns waiting for it (or not).
pub fn spawn_isolated(spec: SpawnSpec) -> Result<SpawnedChild> {
    let (stdin_read, stdin_write) =
        nix::unistd::pipe().map_err(|e| SandboxError::Isolation(format!("pipe: {e}")))?;
    let (stdout_read, stdout_write) =
        nix::unistd::pipe().map_err(|e| SandboxError::Isolation(format!("pipe: {e}")))?;
    let (stderr_read, stderr_write) =
        nix::unistd::pipe().map_err(|e| SandboxError::Isolation(format!("pipe: {e}")))?;

    let stdin_read_fd = stdin_read.as_raw_fd();
    let stdout_write_fd = stdout_write.as_raw_fd();
    let stderr_write_fd = stderr_write.as_raw_fd();

    let program = spec.program.clone();
    let args = spec.args.clone();
    let env = spec.env.clone();
    let isolation = spec.isolation;
    let clone_flags = isolation.clone_flags();

    const STACK_SIZE: usize = 1024 * 1024;
    let mut stack = vec![0u8; STACK_SIZE];

    let child_body = Box::new(move || -> isize {
        unsafe {
            if stdin_read_fd != 0 {
                libc::dup2(stdin_read_fd, 0);
            }
            if stdout_write_fd != 1 {
                libc::dup2(stdout_write_fd, 1);
            }
            if stderr_write_fd != 2 {
                libc::dup2(stderr_write_fd, 2);
            }
        }
        if let Err(e) = isolation.apply() {
            eprintln!("cellbox-sandbox: isolation setup failed: {e}");
            return 127;
        }
        match exec_command(&program, &args, &env) {
            Ok(()) => unreachable!("exec_command only returns on failure"),
            Err(e) => {
                eprintln!("cellbox-sandbox: exec failed: {e}");
                126
            }
        }
    });

    let pid = unsafe { nix::sched::clone(child_body, &mut stack, clone_flags, Some(libc::SIGCHLD)) }
        .map_err(|e| SandboxError::Isolation(format!("clone: {e}")))?;

    drop(stdin_read);
    drop(stdout_write);
    drop(stderr_write);

    Ok(SpawnedChild {
        pid,
        stdin: stdin_write,
        stdout: stdout_read,
        stderr: stderr_read,
    })
}

fn exec_command(program: &str, args: &[String], env: &[(String, String)]) -> Result<()> {
    let cmd = CString::new(program).map_err(|e| SandboxError::Isolation(e.to_string()))?;
    let mut c_args = vec![cmd.clone()];
    for a in args {
        c_args.push(CString::new(a.as_str()).map_err(|e| SandboxError::Isolation(e.to_string()))?);
    }
    let c_env: Vec<CString> = env
        .iter()
        .map(|(k, v)| CString::new(format!("{k}={v}")).map_err(|e| SandboxError::Isolation(e.to_string())))
        .collect::<Result<_>>()?;

    nix::unistd::execvpe(&cmd, &c_args, &c_env).map_err(|e| SandboxError::Isolation(format!("execvpe: {e}")))?;
    unreachable!("execvpe only returns on error, which is mapped above");
}
