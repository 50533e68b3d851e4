use std::path::PathBuf;

/// Mirrors the teacher's narrow, `#[from]`-driven error enums (`core/src/error.rs`):
/// one variant per distinct failure kind a caller might branch on, everything
/// else folded through `#[from]`.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to create sandbox directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove sandbox directory {path}: {source}")]
    RemoveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("namespace setup failed: {0}")]
    Namespace(String),

    #[error("mount failed for {target}: {source}")]
    Mount {
        target: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("chroot/chown/exec step failed: {0}")]
    Isolation(String),

    #[error("command spawn failed: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("command exceeded its timeout and was killed")]
    Timeout,

    #[error("child join failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
