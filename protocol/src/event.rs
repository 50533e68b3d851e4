use serde::Serialize;

use crate::ids::ExecutionId;
use crate::ids::SandboxId;
use crate::ids::SessionId;
use crate::language::Language;

/// Events published by the core to the in-process event bus (§6). Delivery
/// is in-order, best-effort, at-most-once per subscriber; subscriber
/// failures are swallowed and logged by the bus, never by the publisher.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum Event {
    ContainerAcquiredFromPool {
        sandbox_id: SandboxId,
        session_id: SessionId,
        language: Language,
        acquire_time_ms: u64,
    },
    ContainerCreatedFresh {
        sandbox_id: SandboxId,
        session_id: SessionId,
        language: Language,
        reason: CreatedFreshReason,
    },
    PoolExhausted {
        language: Language,
        session_id: SessionId,
    },
    PoolWarmedUp {
        language: Language,
        count: usize,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        session_id: SessionId,
        success: bool,
        execution_time_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedFreshReason {
    PoolEmpty,
    PoolDisabled,
}
