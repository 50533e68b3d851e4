use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use cellbox_protocol::{Language, SandboxId, SessionId};
use tracing::{debug, instrument};

use crate::descriptor::SandboxDescriptor;
use crate::error::{Result, SandboxError};

/// Owns the sandboxes root directory and the create/destroy/write/read
/// primitives of §4.1. Every other component (pool, orchestrator, REPL
/// driver-side executor) goes through this type rather than touching the
/// filesystem directly.
#[derive(Debug, Clone)]
pub struct SandboxManager {
    base_dir: PathBuf,
}

impl SandboxManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[instrument(skip(self), fields(language = %language))]
    pub fn create(&self, language: Language, session_id: Option<SessionId>) -> Result<SandboxDescriptor> {
        let id = SandboxId::new();
        let root = self.base_dir.join(id.as_str());
        let data_dir = root.join("data");
        fs::create_dir_all(&data_dir).map_err(|source| SandboxError::CreateDir {
            path: data_dir.clone(),
            source,
        })?;
        fs::set_permissions(&data_dir, fs::Permissions::from_mode(0o777)).map_err(|source| {
            SandboxError::CreateDir {
                path: data_dir.clone(),
                source,
            }
        })?;
        debug!(sandbox_id = %id, ?data_dir, "sandbox created");
        Ok(SandboxDescriptor::new(root, id, language, session_id))
    }

    /// Idempotent on a missing tree (§4.1). The REPL process, if any, must
    /// already be killed by the caller (the pool's tracking map owns that
    /// lifetime, not this manager).
    #[instrument(skip(self, descriptor), fields(sandbox_id = %descriptor.id))]
    pub fn destroy(&self, descriptor: &SandboxDescriptor) -> Result<()> {
        match fs::remove_dir_all(descriptor.root_dir()) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SandboxError::RemoveDir {
                path: descriptor.root_dir().to_path_buf(),
                source,
            }),
        }
    }

    /// `dest` may be absolute (`/mnt/data/foo`) or bare (`foo`); only the
    /// basename is honored so a write can never escape `data_dir` (§4.1).
    pub fn write_file(&self, descriptor: &SandboxDescriptor, dest: &str, bytes: &[u8]) -> Result<PathBuf> {
        let basename = basename_of(dest);
        let path = descriptor.data_dir().join(&basename);
        fs::write(&path, bytes).map_err(|source| SandboxError::WriteFile {
            path: path.clone(),
            source,
        })?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).map_err(|source| {
            SandboxError::WriteFile {
                path: path.clone(),
                source,
            }
        })?;
        chown_path(&path, descriptor.language, &path).map_err(SandboxError::Isolation)?;
        Ok(path)
    }

    /// Tries `<data_dir>/<basename(source)>` first, then the full sub-path
    /// under `data_dir` (§4.1). Returns `None` rather than an error when
    /// nothing is found — a missing file is an ordinary outcome here.
    pub fn read_file(&self, descriptor: &SandboxDescriptor, source: &str) -> Result<Option<Vec<u8>>> {
        let data_dir = descriptor.data_dir();
        let by_basename = data_dir.join(basename_of(source));
        if let Some(bytes) = try_read(&by_basename)? {
            return Ok(Some(bytes));
        }
        let stripped = source.strip_prefix('/').unwrap_or(source);
        let full = data_dir.join(stripped);
        try_read(&full)
    }
}

fn try_read(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SandboxError::ReadFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn basename_of(dest: &str) -> String {
    Path::new(dest)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| dest.to_string())
}

fn chown_path(path: &Path, language: Language, _unused: &Path) -> std::result::Result<(), String> {
    let registry = cellbox_langs::LanguageRegistry::default();
    let spec = registry.get(language);
    nix::unistd::chown(
        path,
        Some(nix::unistd::Uid::from_raw(spec.uid)),
        Some(nix::unistd::Gid::from_raw(spec.gid)),
    )
    .map_err(|e| format!("chown {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_makes_a_world_writable_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path());
        let descriptor = manager.create(Language::Py, None).unwrap();
        let meta = fs::metadata(descriptor.data_dir()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o777);
    }

    #[test]
    fn destroy_is_idempotent_on_a_missing_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path());
        let descriptor = manager.create(Language::Py, None).unwrap();
        manager.destroy(&descriptor).unwrap();
        manager.destroy(&descriptor).unwrap();
    }

    #[test]
    fn read_file_falls_back_to_basename_when_the_full_path_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path());
        let descriptor = manager.create(Language::Py, None).unwrap();
        fs::write(descriptor.data_dir().join("out.csv"), b"a,b\n1,2\n").unwrap();
        let bytes = manager
            .read_file(&descriptor, "/mnt/data/out.csv")
            .unwrap()
            .unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");
    }

    #[test]
    fn read_file_returns_none_when_nothing_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path());
        let descriptor = manager.create(Language::Py, None).unwrap();
        assert!(manager.read_file(&descriptor, "missing.txt").unwrap().is_none());
    }
}
