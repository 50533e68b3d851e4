#[derive(Debug, thiserror::Error)]
pub enum ReplError {
    #[error("failed to spawn repl process: {0}")]
    Spawn(#[from] cellbox_sandbox::SandboxError),

    #[error("repl startup timed out after {0:?}")]
    StartupTimeout(std::time::Duration),

    #[error("repl ready frame was malformed: {0}")]
    BadReadyFrame(#[from] cellbox_protocol::repl::ReplFrameError),

    #[error("repl ready frame was not the first frame emitted")]
    NotReady,

    #[error("io error talking to repl: {0}")]
    Io(#[from] std::io::Error),

    #[error("repl process is no longer alive")]
    Dead,
}

pub type Result<T> = std::result::Result<T, ReplError>;
