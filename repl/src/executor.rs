//! Driver-side executor (§4.3 "Driver-side executor"): the component that
//! owns a live `ReplHandle` and speaks request/response frames to it.
//! Grounded on `SandboxREPLExecutor.execute`/`execute_with_state`/
//! `check_health` in the original source's `repl_executor.py`, with the
//! duck-typed JSON response replaced by the closed `ReplFrame` sum type
//! (§9 Design Notes).

use std::time::Duration;

use cellbox_protocol::repl::{ReplFrame, ReplRequest};
use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::error::{ReplError, Result};
use crate::handle::ReplHandle;

#[derive(Debug, Clone)]
pub struct ReplExecutionOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub state: Option<String>,
    pub state_errors: Vec<String>,
}

impl ReplExecutionOutcome {
    fn timed_out(timeout_s: u64) -> Self {
        Self {
            exit_code: 124,
            stdout: String::new(),
            stderr: format!("Execution timed out after {timeout_s} seconds"),
            state: None,
            state_errors: Vec::new(),
        }
    }
}

/// Plain execution, no state persistence: overall deadline is `timeout + 5`
/// seconds, matching the original `execute()`'s slack (distinct from
/// `execute_with_state`'s `+10`).
#[instrument(skip(handle, code), fields(sandbox_id = %handle.sandbox_id, timeout_s))]
pub async fn execute(
    handle: &mut ReplHandle,
    code: String,
    timeout_s: u64,
    working_dir: String,
) -> Result<ReplExecutionOutcome> {
    run_request(
        handle,
        ReplRequest {
            code,
            timeout: timeout_s,
            working_dir,
            args: None,
            initial_state: None,
            capture_state: None,
        },
        Duration::from_secs(timeout_s + 5),
    )
    .await
}

/// Execution with optional state restoration/capture (§4.3). Overall
/// deadline is `timeout + 10` seconds; a miss marks the handle stale so the
/// pool destroys rather than recycles it.
#[instrument(skip(handle, code, initial_state), fields(sandbox_id = %handle.sandbox_id, timeout_s, capture_state))]
#[allow(clippy::too_many_arguments)]
pub async fn execute_with_state(
    handle: &mut ReplHandle,
    code: String,
    timeout_s: u64,
    working_dir: String,
    initial_state: Option<String>,
    capture_state: bool,
    args: Option<Vec<String>>,
) -> Result<ReplExecutionOutcome> {
    run_request(
        handle,
        ReplRequest {
            code,
            timeout: timeout_s,
            working_dir,
            args,
            initial_state,
            capture_state: Some(capture_state),
        },
        Duration::from_secs(timeout_s + 10),
    )
    .await
}

async fn run_request(
    handle: &mut ReplHandle,
    request: ReplRequest,
    deadline: Duration,
) -> Result<ReplExecutionOutcome> {
    if !handle.is_alive() {
        return Err(ReplError::Dead);
    }
    let timeout_s = request.timeout;

    match timeout(deadline, send_and_receive(handle, &request)).await {
        Ok(result) => result,
        Err(_elapsed) => {
            warn!(timeout_s, "repl did not respond within its deadline; marking stale");
            handle.mark_stale();
            Ok(ReplExecutionOutcome::timed_out(timeout_s))
        }
    }
}

async fn send_and_receive(
    handle: &mut ReplHandle,
    request: &ReplRequest,
) -> Result<ReplExecutionOutcome> {
    handle.write_frame(&request.encode()).await?;
    let body = handle.read_one_frame().await?.ok_or(ReplError::Dead)?;
    match ReplFrame::decode(&body)? {
        ReplFrame::Completed(resp) => Ok(ReplExecutionOutcome {
            exit_code: resp.exit_code,
            stdout: resp.stdout,
            stderr: resp.stderr,
            state: resp.state,
            state_errors: resp.state_errors,
        }),
        ReplFrame::Ready => Err(ReplError::NotReady),
    }
}

/// Sends `print('health_check_ok')` and checks it shows up within five
/// seconds flat (not `timeout + slack`) — used by the pool to discard stale
/// REPL processes on acquisition (§4.3, §4.4).
#[instrument(skip(handle), fields(sandbox_id = %handle.sandbox_id))]
pub async fn check_health(handle: &mut ReplHandle) -> bool {
    let result = timeout(
        Duration::from_secs(5),
        send_and_receive(
            handle,
            &ReplRequest {
                code: "print('health_check_ok')".to_string(),
                timeout: 5,
                working_dir: "/mnt/data".to_string(),
                args: None,
                initial_state: None,
                capture_state: None,
            },
        ),
    )
    .await;

    match result {
        Ok(Ok(outcome)) => outcome.exit_code == 0 && outcome.stdout.contains("health_check_ok"),
        _ => {
            handle.mark_stale();
            false
        }
    }
}
