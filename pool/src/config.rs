//! Pool tuning knobs (§4.4), loaded from the `CELLBOX_POOL_*` environment
//! variables named in §6. Only Python ever has a nonzero target size: every
//! other language is one-shot-only and is never pre-warmed (§4.4 "only
//! Python sandboxes are pooled").

use std::collections::HashMap;
use std::time::Duration;

use cellbox_protocol::Language;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub enabled: bool,
    pub warmup_on_startup: bool,
    /// Target number of warm sandboxes to hold per language. Every entry
    /// other than `Py` is `0` (§4.4): no other language supports REPL mode,
    /// so pooling them would only hold idle sandbox directories nobody asks
    /// for by a fast path.
    pub target_sizes: HashMap<Language, u32>,
    pub parallel_batch: u32,
    pub replenish_interval: Duration,
    pub exhaustion_trigger: bool,
    pub repl_warmup_timeout: Duration,
}

impl PoolConfig {
    pub fn target_size(&self, language: Language) -> u32 {
        self.target_sizes.get(&language).copied().unwrap_or(0)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let mut target_sizes = HashMap::new();
        target_sizes.insert(Language::Py, 2);

        Self {
            enabled: true,
            warmup_on_startup: true,
            target_sizes,
            parallel_batch: 5,
            replenish_interval: Duration::from_secs(2),
            exhaustion_trigger: true,
            repl_warmup_timeout: Duration::from_secs(15),
        }
    }
}

/// Loads `PoolConfig` from the environment, falling back to the defaults
/// above for anything unset (§6). `CELLBOX_POOL_PARALLEL_BATCH` is clamped to
/// `1..=10` and `CELLBOX_POOL_REPLENISH_INTERVAL_SECS` to `1..=30`, matching
/// the original service's field bounds.
pub fn from_env() -> PoolConfig {
    let defaults = PoolConfig::default();
    let parallel_batch = cellbox_common::env_or("CELLBOX_POOL_PARALLEL_BATCH", defaults.parallel_batch).clamp(1, 10);
    let replenish_secs: u64 = cellbox_common::env_or("CELLBOX_POOL_REPLENISH_INTERVAL_SECS", defaults.replenish_interval.as_secs()).clamp(1, 30);
    let py_size: u32 = cellbox_common::env_or("CELLBOX_POOL_PY_SIZE", defaults.target_size(Language::Py)).clamp(0, 50);

    let mut target_sizes = HashMap::new();
    target_sizes.insert(Language::Py, py_size);

    PoolConfig {
        enabled: cellbox_common::env_or("CELLBOX_POOL_ENABLED", defaults.enabled),
        warmup_on_startup: cellbox_common::env_or("CELLBOX_POOL_WARMUP_ON_STARTUP", defaults.warmup_on_startup),
        target_sizes,
        parallel_batch,
        replenish_interval: Duration::from_secs(replenish_secs),
        exhaustion_trigger: cellbox_common::env_or("CELLBOX_POOL_EXHAUSTION_TRIGGER", defaults.exhaustion_trigger),
        repl_warmup_timeout: Duration::from_secs(cellbox_common::env_or(
            "CELLBOX_REPL_WARMUP_TIMEOUT_SECS",
            defaults.repl_warmup_timeout.as_secs(),
        )),
    }
}
