//! Per-language pool of pre-warmed Python REPL sandboxes (§4.4). Grounded on
//! `services/sandbox/pool.py`'s `SandboxPool`: a bounded queue per language
//! (only `py` ever has a nonzero target), a tracking map from sandbox id to
//! its live REPL handle for sandboxes currently checked out, and a
//! background warmup task that tops the queues back up in parallel batches.
//!
//! The queue/tracking-map/stats state lives behind one `std::sync::Mutex`
//! whose critical sections never cross an `.await` point — only `VecDeque`/
//! `HashMap` pushes, pops, and counter bumps happen under it, matching the
//! original's single `asyncio.Lock`-free design (it never actually took a
//! lock across awaits either). The REPL handle itself is wrapped in its own
//! `tokio::sync::Mutex` so a long-running execution holds only that handle's
//! lock, not the whole pool's.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use cellbox_events::EventBus;
use cellbox_langs::LanguageRegistry;
use cellbox_protocol::event::CreatedFreshReason;
use cellbox_protocol::{Event, Language, SandboxId, SessionId};
use cellbox_repl::ReplHandle;
use cellbox_sandbox::{IsolationPlan, SandboxDescriptor, SandboxManager};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::PoolConfig;
use crate::error::Result;
use crate::stats::{LanguagePoolStats, PoolStats};

pub type SharedReplHandle = Arc<tokio::sync::Mutex<ReplHandle>>;

struct PooledEntry {
    descriptor: SandboxDescriptor,
    repl: SharedReplHandle,
}

#[derive(Default)]
struct PoolState {
    queues: HashMap<Language, VecDeque<PooledEntry>>,
    tracking: HashMap<SandboxId, SharedReplHandle>,
    stats: HashMap<Language, PoolStats>,
}

/// What `SandboxPool::acquire` hands back: a sandbox ready to run code in,
/// plus its REPL handle when one exists (Python with REPL mode enabled and
/// successfully started; `None` for every one-shot language).
pub struct AcquiredSandbox {
    pub descriptor: SandboxDescriptor,
    pub repl: Option<SharedReplHandle>,
}

/// Host paths to mask with empty tmpfs inside every sandbox's mount
/// namespace (§4.2 step 3), loaded once at pool construction.
#[derive(Debug, Clone)]
pub struct HostMaskPaths {
    pub sandboxes_root: PathBuf,
    pub metrics_dir: PathBuf,
    pub log_dir: PathBuf,
    pub ssl_dir: PathBuf,
    pub dashboard_dir: PathBuf,
    pub app_src_dir: PathBuf,
}

impl HostMaskPaths {
    pub fn from_env() -> Self {
        Self {
            sandboxes_root: cellbox_common::env_or("CELLBOX_SANDBOXES_ROOT", "/app/sandboxes".to_string()).into(),
            metrics_dir: cellbox_common::env_or("CELLBOX_METRICS_DIR", "/app/metrics".to_string()).into(),
            log_dir: cellbox_common::env_or("CELLBOX_LOG_DIR", "/var/log/cellbox".to_string()).into(),
            ssl_dir: cellbox_common::env_or("CELLBOX_SSL_DIR", "/etc/cellbox/ssl".to_string()).into(),
            dashboard_dir: cellbox_common::env_or("CELLBOX_DASHBOARD_DIR", "/app/dashboard".to_string()).into(),
            app_src_dir: cellbox_common::env_or("CELLBOX_APP_SRC_DIR", "/app/src".to_string()).into(),
        }
    }

    pub fn as_vec(&self) -> Vec<PathBuf> {
        cellbox_sandbox::masked_host_paths(
            &self.sandboxes_root,
            &self.metrics_dir,
            &self.log_dir,
            &self.ssl_dir,
            &self.dashboard_dir,
            &self.app_src_dir,
        )
    }
}

pub struct SandboxPool {
    manager: Arc<SandboxManager>,
    registry: Arc<LanguageRegistry>,
    events: EventBus,
    config: PoolConfig,
    mask_paths: HostMaskPaths,
    state: Mutex<PoolState>,
    replenish: Notify,
    warmup_task: Mutex<Option<JoinHandle<()>>>,
    exhaustion_task: Mutex<Option<JoinHandle<()>>>,
}

impl SandboxPool {
    pub fn new(manager: Arc<SandboxManager>, registry: Arc<LanguageRegistry>, events: EventBus, config: PoolConfig, mask_paths: HostMaskPaths) -> Arc<Self> {
        let mut queues = HashMap::new();
        for lang in Language::ALL {
            queues.insert(lang, VecDeque::new());
        }

        Arc::new(Self {
            manager,
            registry,
            events,
            config,
            mask_paths,
            state: Mutex::new(PoolState {
                queues,
                tracking: HashMap::new(),
                stats: HashMap::new(),
            }),
            replenish: Notify::new(),
            warmup_task: Mutex::new(None),
            exhaustion_task: Mutex::new(None),
        })
    }

    /// Starts the background warmup loop and, if exhaustion triggering is
    /// enabled, subscribes to this pool's own `PoolExhausted` events so a
    /// genuine empty-queue pop wakes the warmup loop immediately instead of
    /// waiting for its next tick (§4.4). Idempotent: calling it again on an
    /// already-started pool is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut guard = self.warmup_task.lock().unwrap();
        if guard.is_some() {
            return;
        }
        info!("starting sandbox pool warmup loop");
        let pool = Arc::clone(self);
        *guard = Some(tokio::spawn(async move { pool.warmup_loop().await }));
        drop(guard);

        if self.config.exhaustion_trigger {
            let mut exhaustion_guard = self.exhaustion_task.lock().unwrap();
            if exhaustion_guard.is_none() {
                let pool = Arc::clone(self);
                *exhaustion_guard = Some(tokio::spawn(async move { pool.exhaustion_listener().await }));
            }
        }
    }

    /// Subscribes to this pool's own published `PoolExhausted` events and
    /// wakes the warmup loop at most once per genuine exhaustion (§4.4).
    async fn exhaustion_listener(self: Arc<Self>) {
        let mut rx = self.events.subscribe();
        loop {
            match rx.recv().await {
                Ok(Event::PoolExhausted { .. }) => self.replenish.notify_one(),
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Stops the warmup loop and exhaustion subscription, and tears down
    /// every pooled and checked-out sandbox (§4.4 `stop()`).
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        if let Some(task) = self.warmup_task.lock().unwrap().take() {
            task.abort();
        }
        if let Some(task) = self.exhaustion_task.lock().unwrap().take() {
            task.abort();
        }

        let drained: Vec<PooledEntry> = {
            let mut state = self.state.lock().unwrap();
            state.queues.values_mut().flat_map(|q| q.drain(..)).collect()
        };
        for entry in drained {
            entry.repl.lock().await.kill();
            if let Err(e) = self.manager.destroy(&entry.descriptor) {
                warn!(error = %e, "failed to destroy pooled sandbox during shutdown");
            }
        }

        let tracked: Vec<SharedReplHandle> = {
            let mut state = self.state.lock().unwrap();
            state.tracking.drain().map(|(_, repl)| repl).collect()
        };
        for repl in tracked {
            repl.lock().await.kill();
        }

        info!("sandbox pool stopped");
    }

    /// Acquires a sandbox for `language` (§4.4 `acquire`): pops one warm
    /// entry if available and its REPL is still alive, otherwise publishes
    /// `PoolExhausted` (only when pooling is enabled — a disabled pool never
    /// considers itself exhausted) and creates a fresh sandbox.
    #[instrument(skip(self), fields(%language, %session_id))]
    pub async fn acquire(&self, language: Language, session_id: SessionId) -> Result<AcquiredSandbox> {
        let start = std::time::Instant::now();

        if self.config.enabled {
            let popped = {
                let mut state = self.state.lock().unwrap();
                state.queues.get_mut(&language).and_then(|q| q.pop_front())
            };

            if let Some(entry) = popped {
                let alive = entry.repl.lock().await.is_alive();
                if alive {
                    let acquire_time_ms = start.elapsed().as_secs_f64() * 1000.0;
                    let mut descriptor = entry.descriptor;
                    descriptor.session_id = Some(session_id.clone());

                    {
                        let mut state = self.state.lock().unwrap();
                        state.tracking.insert(descriptor.id, Arc::clone(&entry.repl));
                        state.stats.entry(language).or_default().record_hit(acquire_time_ms);
                    }

                    self.events.publish(Event::ContainerAcquiredFromPool {
                        sandbox_id: descriptor.id,
                        session_id: session_id.clone(),
                        language,
                        acquire_time_ms: acquire_time_ms as u64,
                    });
                    debug!(sandbox_id = %descriptor.id, acquire_time_ms, "acquired sandbox from pool");

                    return Ok(AcquiredSandbox {
                        descriptor,
                        repl: Some(entry.repl),
                    });
                }

                // The pooled REPL died between warmup and acquisition:
                // discard it and fall through to a fresh sandbox rather than
                // retrying the queue (§4.4, matching the original's single
                // pop attempt per acquire).
                if let Err(e) = self.manager.destroy(&entry.descriptor) {
                    warn!(error = %e, "failed to destroy dead pooled sandbox");
                }
            }

            self.events.publish(Event::PoolExhausted {
                language,
                session_id: session_id.clone(),
            });
        }

        let (descriptor, repl) = self.create_fresh(language, session_id.clone()).await?;
        if let Some(repl) = &repl {
            let mut state = self.state.lock().unwrap();
            state.tracking.insert(descriptor.id, Arc::clone(repl));
        }
        {
            let mut state = self.state.lock().unwrap();
            state.stats.entry(language).or_default().record_miss();
        }

        let reason = if self.config.enabled {
            CreatedFreshReason::PoolEmpty
        } else {
            CreatedFreshReason::PoolDisabled
        };
        self.events.publish(Event::ContainerCreatedFresh {
            sandbox_id: descriptor.id,
            session_id,
            language,
            reason,
        });

        Ok(AcquiredSandbox { descriptor, repl })
    }

    /// Looks up the REPL handle tracked for a checked-out sandbox, if any
    /// (§4.4 `get_repl_process`).
    pub fn repl_for(&self, sandbox_id: SandboxId) -> Option<SharedReplHandle> {
        self.state.lock().unwrap().tracking.get(&sandbox_id).cloned()
    }

    /// Tears a checked-out sandbox down after use: kills its tracked REPL
    /// process (if any) and removes its directory (§4.4 `destroy_sandbox`).
    #[instrument(skip(self, descriptor), fields(sandbox_id = %descriptor.id))]
    pub async fn destroy_sandbox(&self, descriptor: &SandboxDescriptor) -> Result<()> {
        let repl = self.state.lock().unwrap().tracking.remove(&descriptor.id);
        if let Some(repl) = repl {
            repl.lock().await.kill();
        }
        self.manager.destroy(descriptor)?;
        let mut state = self.state.lock().unwrap();
        state.stats.entry(descriptor.language).or_default().destroyed += 1;
        Ok(())
    }

    pub fn stats(&self) -> Vec<LanguagePoolStats> {
        let state = self.state.lock().unwrap();
        Language::ALL
            .into_iter()
            .map(|language| {
                let mut stats = state.stats.get(&language).cloned().unwrap_or_default();
                stats.available = state.queues.get(&language).map(|q| q.len()).unwrap_or(0);
                LanguagePoolStats { language, stats }
            })
            .collect()
    }

    async fn create_fresh(&self, language: Language, session_id: SessionId) -> Result<(SandboxDescriptor, Option<SharedReplHandle>)> {
        let descriptor = self.manager.create(language, Some(session_id))?;
        let repl = if language.supports_repl() {
            match self.spawn_repl(&descriptor).await {
                Ok(handle) => Some(Arc::new(tokio::sync::Mutex::new(handle))),
                Err(e) => {
                    warn!(sandbox_id = %descriptor.id, error = %e, "repl not ready in fresh sandbox; continuing without it");
                    None
                }
            }
        } else {
            None
        };
        debug!(sandbox_id = %descriptor.id, %language, repl_mode = repl.is_some(), "created fresh sandbox");
        Ok((descriptor, repl))
    }

    async fn spawn_repl(&self, descriptor: &SandboxDescriptor) -> cellbox_repl::Result<ReplHandle> {
        let spec = self.registry.get(descriptor.language);
        let env = spec.build_env(&std::env::vars().collect()).into_iter().collect();
        let isolation = IsolationPlan::for_language(descriptor.data_dir(), self.mask_paths.as_vec(), spec, false);
        let mut handle = ReplHandle::spawn(descriptor.id, isolation, env)?;
        handle.wait_ready(self.config.repl_warmup_timeout).await?;
        Ok(handle)
    }

    async fn warmup_loop(self: Arc<Self>) {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        loop {
            if self.config.warmup_on_startup {
                for language in Language::ALL {
                    if self.target_size(language) > 0 {
                        self.clone().warmup_language(language).await;
                    }
                }
            }

            if self.config.exhaustion_trigger {
                tokio::select! {
                    _ = self.replenish.notified() => {}
                    _ = tokio::time::sleep(self.config.replenish_interval) => {}
                }
            } else {
                tokio::time::sleep(self.config.replenish_interval).await;
            }
        }
    }

    fn target_size(&self, language: Language) -> u32 {
        self.config.target_size(language)
    }

    /// Tops a single language's queue back up to its target size, creating
    /// sandboxes `parallel_batch` at a time, each batch run concurrently via
    /// a `JoinSet` (§4.4 `_warmup_language`).
    async fn warmup_language(self: Arc<Self>, language: Language) {
        let target = self.target_size(language);
        let current = self.state.lock().unwrap().queues.get(&language).map(|q| q.len()).unwrap_or(0) as u32;
        if current >= target {
            return;
        }

        let mut remaining = target - current;
        let batch_size = self.config.parallel_batch;
        let mut created = 0usize;

        while remaining > 0 {
            let batch = remaining.min(batch_size);
            let mut set = tokio::task::JoinSet::new();
            for _ in 0..batch {
                let pool = Arc::clone(&self);
                set.spawn(async move { pool.create_pooled_entry(language).await });
            }
            while let Some(result) = set.join_next().await {
                match result {
                    Ok(Some(entry)) => {
                        let mut state = self.state.lock().unwrap();
                        state.queues.entry(language).or_default().push_back(entry);
                        state.stats.entry(language).or_default().created += 1;
                        created += 1;
                    }
                    Ok(None) => warn!(%language, "failed to create pooled sandbox during warmup"),
                    Err(e) => warn!(%language, error = %e, "warmup task panicked"),
                }
            }
            remaining -= batch;
        }

        if created > 0 {
            self.events.publish(Event::PoolWarmedUp { language, count: created });
            info!(%language, created, "warmed up sandboxes");
        }
    }

    /// Only Python ever calls this: every other language's target size is
    /// always zero, so `warmup_language` never schedules it for them.
    async fn create_pooled_entry(&self, language: Language) -> Option<PooledEntry> {
        let pool_session = SessionId::from_string(format!("pool-{language}-{}", uuid_suffix()));
        let descriptor = self.manager.create(language, Some(pool_session)).ok()?;

        match self.spawn_repl(&descriptor).await {
            Ok(handle) => Some(PooledEntry {
                descriptor,
                repl: Arc::new(tokio::sync::Mutex::new(handle)),
            }),
            Err(e) => {
                warn!(sandbox_id = %descriptor.id, error = %e, "repl not ready, discarding pooled sandbox");
                let _ = self.manager.destroy(&descriptor);
                None
            }
        }
    }
}

fn uuid_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool() -> (Arc<SandboxPool>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Arc::new(SandboxManager::new(tmp.path()));
        let registry = Arc::new(LanguageRegistry::default());
        let events = EventBus::new();
        let mut config = PoolConfig::default();
        config.target_sizes.clear();
        let mask_paths = HostMaskPaths {
            sandboxes_root: PathBuf::from("/does/not/exist/sandboxes"),
            metrics_dir: PathBuf::from("/does/not/exist/metrics"),
            log_dir: PathBuf::from("/does/not/exist/log"),
            ssl_dir: PathBuf::from("/does/not/exist/ssl"),
            dashboard_dir: PathBuf::from("/does/not/exist/dashboard"),
            app_src_dir: PathBuf::from("/does/not/exist/src"),
        };
        let pool = SandboxPool::new(manager, registry, events, config, mask_paths);
        (pool, tmp)
    }

    #[tokio::test]
    async fn acquiring_a_one_shot_language_never_spawns_a_repl() {
        let (pool, _tmp) = test_pool();
        let acquired = pool.acquire(Language::Js, SessionId::new()).await.unwrap();
        assert!(acquired.repl.is_none());
        assert!(pool.repl_for(acquired.descriptor.id).is_none());
    }

    #[tokio::test]
    async fn empty_pool_publishes_exhausted_then_created_fresh_with_pool_empty_reason() {
        let (pool, _tmp) = test_pool();
        let mut rx = pool.events.subscribe();
        pool.acquire(Language::Js, SessionId::new()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Event::PoolExhausted { language: Language::Js, .. }));
        let second = rx.recv().await.unwrap();
        match second {
            Event::ContainerCreatedFresh { reason, .. } => {
                assert!(matches!(reason, CreatedFreshReason::PoolEmpty))
            }
            other => panic!("expected ContainerCreatedFresh, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_pool_skips_the_exhausted_event_and_reports_pool_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Arc::new(SandboxManager::new(tmp.path()));
        let registry = Arc::new(LanguageRegistry::default());
        let events = EventBus::new();
        let config = PoolConfig {
            enabled: false,
            ..PoolConfig::default()
        };
        let mask_paths = HostMaskPaths {
            sandboxes_root: PathBuf::from("/does/not/exist/sandboxes"),
            metrics_dir: PathBuf::from("/does/not/exist/metrics"),
            log_dir: PathBuf::from("/does/not/exist/log"),
            ssl_dir: PathBuf::from("/does/not/exist/ssl"),
            dashboard_dir: PathBuf::from("/does/not/exist/dashboard"),
            app_src_dir: PathBuf::from("/does/not/exist/src"),
        };
        let disabled_pool = SandboxPool::new(manager, registry, events, config, mask_paths);
        let mut rx = disabled_pool.events.subscribe();

        disabled_pool.acquire(Language::Js, SessionId::new()).await.unwrap();
        let event = rx.recv().await.unwrap();
        match event {
            Event::ContainerCreatedFresh { reason, .. } => {
                assert!(matches!(reason, CreatedFreshReason::PoolDisabled))
            }
            other => panic!("expected ContainerCreatedFresh, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn destroy_sandbox_removes_it_from_the_tracking_map_and_bumps_destroyed_stat() {
        let (pool, _tmp) = test_pool();
        let acquired = pool.acquire(Language::Js, SessionId::new()).await.unwrap();
        pool.destroy_sandbox(&acquired.descriptor).await.unwrap();

        let stats = pool.stats();
        let js_stats = stats.iter().find(|s| s.language == Language::Js).unwrap();
        assert_eq!(js_stats.stats.destroyed, 1);
    }

    #[tokio::test]
    async fn repeated_acquisitions_record_a_running_average_acquire_time() {
        let (pool, _tmp) = test_pool();
        pool.acquire(Language::Js, SessionId::new()).await.unwrap();
        pool.acquire(Language::Js, SessionId::new()).await.unwrap();

        let stats = pool.stats();
        let js_stats = stats.iter().find(|s| s.language == Language::Js).unwrap();
        assert_eq!(js_stats.stats.total_acquisitions, 2);
        assert_eq!(js_stats.stats.pool_misses, 2);
    }
}
