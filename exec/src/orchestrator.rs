//! The execution orchestrator (§4.6): the pipeline that turns one exec
//! request into a sandboxed run and a response, owning the sandbox's
//! lifetime end to end. Grounded on `CodeExecutionRunner.execute` and its
//! private helpers in `services/execution/runner.py`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cellbox_events::EventBus;
use cellbox_langs::LanguageRegistry;
use cellbox_pool::{HostMaskPaths, SandboxPool, SharedReplHandle};
use cellbox_protocol::http::{ExecRequest, ExecResponse, GeneratedFileRef};
use cellbox_protocol::state::SerializedState;
use cellbox_protocol::{Event, ExecutionId, Language, SessionId};
use cellbox_sandbox::{run_one_shot, IsolationPlan, OneShotSpec, SandboxDescriptor, SandboxManager};
use cellbox_store::{FileStore, SessionStore, StateStore};
use tokio::sync::mpsc;
use tracing::{error, instrument, warn};

use crate::args;
use crate::config::ExecConfig;
use crate::error::{ExecError, Result};
use crate::mount;
use crate::outputs;
use crate::session::resolve_session;

struct CleanupJob {
    descriptor: SandboxDescriptor,
}

/// Owns the checked-out sandbox for the lifetime of one execution and
/// guarantees it is always handed to the cleanup worker, even if the
/// owning future is dropped mid-pipeline (§5: "an orchestrator cancelled
/// mid-pipeline must still run its cleanup step... publish a 'cancelled'
/// completion event"). Modeled on the teacher's `KillOnDrop`.
struct SandboxGuard {
    descriptor: Option<SandboxDescriptor>,
    cleanup_tx: mpsc::UnboundedSender<CleanupJob>,
    events: EventBus,
    execution_id: ExecutionId,
    session_id: SessionId,
    started_at: Instant,
    completed: bool,
}

impl SandboxGuard {
    fn new(
        descriptor: SandboxDescriptor,
        cleanup_tx: mpsc::UnboundedSender<CleanupJob>,
        events: EventBus,
        execution_id: ExecutionId,
        session_id: SessionId,
    ) -> Self {
        Self {
            descriptor: Some(descriptor),
            cleanup_tx,
            events,
            execution_id,
            session_id,
            started_at: Instant::now(),
            completed: false,
        }
    }

    fn descriptor(&self) -> &SandboxDescriptor {
        self.descriptor.as_ref().expect("descriptor only ever taken by Drop")
    }

    /// Marks the pipeline as having reached its own completion event, so
    /// `Drop` does not also publish a cancellation event on top of it.
    fn disarm(&mut self) {
        self.completed = true;
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        if let Some(descriptor) = self.descriptor.take() {
            let sandbox_id = descriptor.id;
            if self.cleanup_tx.send(CleanupJob { descriptor }).is_err() {
                warn!(sandbox_id = %sandbox_id, "cleanup worker channel closed; sandbox directory may leak");
            }
        }
        if !self.completed {
            self.events.publish(Event::ExecutionCompleted {
                execution_id: self.execution_id,
                session_id: self.session_id.clone(),
                success: false,
                execution_time_ms: self.started_at.elapsed().as_millis() as u64,
            });
        }
    }
}

async fn cleanup_worker_loop(pool: Arc<SandboxPool>, mut rx: mpsc::UnboundedReceiver<CleanupJob>) {
    while let Some(job) = rx.recv().await {
        if let Err(e) = pool.destroy_sandbox(&job.descriptor).await {
            error!(sandbox_id = %job.descriptor.id, error = %e, "failed to destroy sandbox during cleanup");
        }
    }
}

struct RawOutcome {
    exit_code: i32,
    stdout: String,
    stderr: String,
    new_state: Option<String>,
    state_errors: Vec<String>,
    timed_out: bool,
}

/// Wires together the pool, the REPL driver-side executor, the one-shot
/// executor, and the file/session/state stores into the single pipeline of
/// §4.6. Owns exactly one background task, the cleanup worker, for the
/// lifetime of the orchestrator.
pub struct Orchestrator {
    pool: Arc<SandboxPool>,
    manager: Arc<SandboxManager>,
    registry: Arc<LanguageRegistry>,
    events: EventBus,
    config: ExecConfig,
    files: Arc<FileStore>,
    sessions: Arc<SessionStore>,
    states: Arc<StateStore>,
    mask_paths: HostMaskPaths,
    cleanup_tx: mpsc::UnboundedSender<CleanupJob>,
    _cleanup_worker: tokio::task::JoinHandle<()>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<SandboxPool>,
        manager: Arc<SandboxManager>,
        registry: Arc<LanguageRegistry>,
        events: EventBus,
        config: ExecConfig,
        files: Arc<FileStore>,
        sessions: Arc<SessionStore>,
        states: Arc<StateStore>,
        mask_paths: HostMaskPaths,
    ) -> Self {
        let (cleanup_tx, cleanup_rx) = mpsc::unbounded_channel();
        let worker_pool = Arc::clone(&pool);
        let cleanup_worker = tokio::spawn(cleanup_worker_loop(worker_pool, cleanup_rx));
        Self {
            pool,
            manager,
            registry,
            events,
            config,
            files,
            sessions,
            states,
            mask_paths,
            cleanup_tx,
            _cleanup_worker: cleanup_worker,
        }
    }

    fn validate(&self, request: &ExecRequest) -> Result<Language> {
        if request.code.trim().is_empty() {
            return Err(ExecError::Validation("code must not be empty".to_string()));
        }
        Language::from_code(&request.lang)
            .ok_or_else(|| ExecError::Validation(format!("unknown language: {}", request.lang)))
    }

    /// Runs the full §4.6 pipeline for one request. Always returns an
    /// `ExecResponse` when the pipeline itself completes, including when the
    /// user's own code failed or timed out — those are 200-status outcomes,
    /// not orchestrator errors (§7).
    #[instrument(skip(self, request), fields(lang = %request.lang))]
    pub async fn execute(&self, request: ExecRequest) -> Result<ExecResponse> {
        let started_at = Instant::now();
        let execution_id = ExecutionId::new();

        let language = self.validate(&request)?;
        let session_id = resolve_session(&self.sessions, &request).await?;

        let initial_state = if language == Language::Py && self.config.state_persistence_enabled {
            match mount::resolve_restore_state_hash(&self.files, &request.files).await? {
                Some(hash) => self.states.load_by_hash(&hash).await?,
                None => self.states.load_for_session(&session_id).await?,
            }
        } else {
            None
        };

        let mounts = mount::resolve_mounts(&self.files, &session_id, &request.files, &self.config).await?;
        let mounted_filenames: HashSet<String> = mounts.iter().map(|m| m.filename.clone()).collect();

        let acquired = self.pool.acquire(language, session_id.clone()).await?;
        let mut guard = SandboxGuard::new(
            acquired.descriptor,
            self.cleanup_tx.clone(),
            self.events.clone(),
            execution_id,
            session_id.clone(),
        );
        mount::write_mounts(&self.manager, guard.descriptor(), &mounts);

        let args_vec = args::normalize(request.args.clone());
        let spec = self.registry.get(language);
        let timeout_secs = ((self.config.max_execution_time.as_secs() as f64) * spec.timeout_multiplier).round() as u64;

        let outcome = match (language, &acquired.repl) {
            (Language::Py, Some(repl)) => {
                self.run_repl(repl, request.code.clone(), timeout_secs, initial_state.clone(), args_vec.clone()).await?
            }
            _ => {
                self.run_one_shot_language(language, guard.descriptor(), &request.code, &args_vec, Duration::from_secs(timeout_secs)).await?
            }
        };

        let success = outcome.exit_code == 0 && !outcome.timed_out;
        let error_message = if outcome.timed_out {
            Some(format!("execution timed out after {timeout_secs} seconds"))
        } else if !success {
            Some(format!("process exited with status {}", outcome.exit_code))
        } else {
            None
        };

        let stdout = outputs::finalize_stdout(outcome.stdout);
        let stderr = outputs::finalize_stderr(outcome.stderr, !success, error_message.as_deref());

        for err in &outcome.state_errors {
            warn!(session_id = %session_id, error = %err, "repl reported a non-fatal state error");
        }

        let (has_state, state_size, state_hash) = self
            .persist_state(language, &session_id, outcome.new_state.as_deref(), success)
            .await?;

        mount::update_mounted_files(
            &self.files,
            &self.manager,
            guard.descriptor(),
            &mounts,
            &session_id,
            execution_id,
            state_hash.as_deref(),
        )
        .await;

        let generated = mount::harvest_generated_files(
            &self.files,
            &self.manager,
            guard.descriptor(),
            &mounted_filenames,
            spec.source_filename,
            &session_id,
            execution_id,
            state_hash.as_deref(),
            &self.config,
        )
        .await;

        let files = generated
            .into_iter()
            .map(|(id, name)| GeneratedFileRef {
                id,
                name,
                session_id: session_id.clone(),
            })
            .collect();

        let response = ExecResponse {
            session_id: session_id.clone(),
            files,
            stdout,
            stderr,
            has_state,
            state_size,
            state_hash,
        };

        self.events.publish(Event::ExecutionCompleted {
            execution_id,
            session_id,
            success,
            execution_time_ms: started_at.elapsed().as_millis() as u64,
        });
        guard.disarm();

        Ok(response)
    }

    async fn run_repl(
        &self,
        repl: &SharedReplHandle,
        code: String,
        timeout_secs: u64,
        initial_state: Option<String>,
        args_vec: Vec<String>,
    ) -> Result<RawOutcome> {
        let args_opt = if args_vec.is_empty() { None } else { Some(args_vec) };
        let mut handle = repl.lock().await;
        let outcome = cellbox_repl::execute_with_state(
            &mut handle,
            code,
            timeout_secs,
            "/mnt/data".to_string(),
            initial_state,
            self.config.state_persistence_enabled,
            args_opt,
        )
        .await?;
        Ok(RawOutcome {
            exit_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            new_state: outcome.state,
            state_errors: outcome.state_errors,
            timed_out: outcome.exit_code == 124,
        })
    }

    /// One-shot path for every non-REPL language, and for Python when its
    /// pooled REPL failed to come up (§4.6 step 6, §4.1). Runs on a blocking
    /// thread since `run_one_shot` waits synchronously on the child.
    async fn run_one_shot_language(
        &self,
        language: Language,
        descriptor: &SandboxDescriptor,
        code: &str,
        args_vec: &[String],
        timeout: Duration,
    ) -> Result<RawOutcome> {
        let spec = self.registry.get(language).clone();
        self.manager.write_file(descriptor, spec.source_filename, code.as_bytes())?;

        let basename = Path::new(spec.source_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(spec.source_filename)
            .to_string();
        let full_path = format!("/mnt/data/{}", spec.source_filename);
        let mut command_line = spec.command_for(&full_path, &basename);
        if !args_vec.is_empty() {
            command_line.push(' ');
            command_line.push_str(&args::shell_quote_tail(args_vec));
        }

        let isolation = IsolationPlan::for_language(descriptor.data_dir(), self.mask_paths.as_vec(), &spec, false);
        let env: Vec<(String, String)> = spec.build_env(&std::env::vars().collect()).into_iter().collect();
        let stdin = if spec.takes_stdin { Some(code.as_bytes().to_vec()) } else { None };

        let one_shot = OneShotSpec {
            isolation,
            program: "sh".to_string(),
            args: vec!["-c".to_string(), command_line],
            env,
            stdin,
            timeout,
        };

        let outcome = tokio::task::spawn_blocking(move || run_one_shot(one_shot)).await??;
        Ok(RawOutcome {
            exit_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            new_state: None,
            state_errors: Vec::new(),
            timed_out: outcome.timed_out,
        })
    }

    /// Saves newly captured state when persistence is enabled and the
    /// outcome qualifies — success, or failure with capture-on-error turned
    /// on (§4.6 step 8). Returns the `(has_state, state_size, state_hash)`
    /// triple for the response.
    async fn persist_state(
        &self,
        language: Language,
        session_id: &SessionId,
        new_state: Option<&str>,
        success: bool,
    ) -> Result<(Option<bool>, Option<u64>, Option<String>)> {
        if language != Language::Py || !self.config.state_persistence_enabled {
            return Ok((None, None, None));
        }

        let Some(state_b64) = new_state else {
            return Ok((Some(false), None, None));
        };

        if !(success || self.config.capture_state_on_error) {
            return Ok((Some(false), None, None));
        }

        match SerializedState::from_base64(state_b64) {
            Ok(parsed) => {
                let (saved, hash) = self.states.save(session_id, state_b64).await?;
                Ok((Some(saved), Some(parsed.raw_bytes().len() as u64), Some(hash)))
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "captured state failed validation; not persisted");
                Ok((Some(false), None, None))
            }
        }
    }
}
