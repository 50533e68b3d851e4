//! Per-language pool of pre-warmed Python REPL sandboxes (§4.4). Grounded on
//! `services/sandbox/pool.py`: a bounded queue of warm sandboxes per
//! language (only Python is ever pooled — every other language is one-shot
//! only), a tracking map from sandbox id to live REPL handle for sandboxes
//! currently checked out, and a background warmup task that replenishes the
//! queues in parallel batches on a timer, with an optional exhaustion-event
//! fast path.

pub mod config;
pub mod error;
pub mod sandbox_pool;
pub mod stats;

pub use config::{from_env, PoolConfig};
pub use error::{PoolError, Result};
pub use sandbox_pool::{AcquiredSandbox, HostMaskPaths, SandboxPool, SharedReplHandle};
pub use stats::{LanguagePoolStats, PoolStats};
