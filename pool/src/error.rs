#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("sandbox operation failed: {0}")]
    Sandbox(#[from] cellbox_sandbox::SandboxError),

    #[error("pool is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, PoolError>;
