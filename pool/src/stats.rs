//! Per-language pool statistics (§4.4), mirroring the original `PoolStats`
//! dataclass: hit/miss counters plus a running average acquire time.

use cellbox_protocol::Language;

#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub available: usize,
    pub total_acquisitions: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub created: u64,
    pub destroyed: u64,
    pub avg_acquire_time_ms: f64,
}

impl PoolStats {
    pub(crate) fn record_hit(&mut self, acquire_time_ms: f64) {
        self.total_acquisitions += 1;
        self.pool_hits += 1;
        self.roll_in_acquire_time(acquire_time_ms);
    }

    pub(crate) fn record_miss(&mut self) {
        self.total_acquisitions += 1;
        self.pool_misses += 1;
    }

    fn roll_in_acquire_time(&mut self, acquire_time_ms: f64) {
        if acquire_time_ms <= 0.0 {
            return;
        }
        let n = self.total_acquisitions as f64;
        self.avg_acquire_time_ms = (self.avg_acquire_time_ms * (n - 1.0) + acquire_time_ms) / n;
    }
}

/// A stats snapshot returned by [`crate::sandbox_pool::SandboxPool::stats`],
/// labeled by language since the pool keeps one counter set per language.
#[derive(Debug, Clone)]
pub struct LanguagePoolStats {
    pub language: Language,
    pub stats: PoolStats,
}
