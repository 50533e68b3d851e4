use std::path::{Path, PathBuf};

use cellbox_protocol::{Language, SandboxId, SessionId};

/// A created-but-not-yet-running sandbox: a directory tree on the host plus
/// the identity needed to tear it back down. Creation never starts a process
/// (§4.1) — starting one, REPL or one-shot, is a separate step owned by the
/// caller (`cellbox-repl` / `cellbox-sandbox`'s executor).
#[derive(Debug, Clone)]
pub struct SandboxDescriptor {
    pub id: SandboxId,
    pub language: Language,
    pub session_id: Option<SessionId>,
    base_dir: PathBuf,
}

impl SandboxDescriptor {
    pub fn new(base_dir: PathBuf, id: SandboxId, language: Language, session_id: Option<SessionId>) -> Self {
        Self {
            id,
            language,
            session_id,
            base_dir,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `<base>/<sandbox_id>/data`, mounted into the child as `/mnt/data`.
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }
}
