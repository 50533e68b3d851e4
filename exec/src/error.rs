//! Error taxonomy for the orchestrator (§7): a handful of kinds the HTTP
//! layer branches on directly (`Validation` → 4xx, `SandboxUnavailable` →
//! 503), with everything else folded into `Internal` via `#[from]`. User
//! code failing or timing out is never represented here — that is a normal,
//! 200-status outcome recorded on the response itself.

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("{0}")]
    Validation(String),

    #[error("sandbox service unavailable: {0}")]
    SandboxUnavailable(#[from] cellbox_pool::PoolError),

    #[error("store error: {0}")]
    Store(#[from] cellbox_store::StoreError),

    #[error("repl error: {0}")]
    Repl(#[from] cellbox_repl::ReplError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] cellbox_sandbox::SandboxError),

    #[error("execution task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ExecError>;
