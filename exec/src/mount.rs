//! File mounting and harvesting (§4.6 steps 4, 9, 10): resolving which files
//! a request wants in the sandbox, fetching their bytes, and — after
//! execution — writing back whichever of them user code modified plus
//! anything newly created.

use std::collections::HashSet;
use std::path::Path;

use cellbox_protocol::http::FileRefRequest;
use cellbox_protocol::{ExecutionId, FileId, SessionId, StoredFile};
use cellbox_sandbox::SandboxDescriptor;
use cellbox_sandbox::SandboxManager;
use cellbox_store::FileStore;
use chrono::Utc;
use tracing::warn;

use crate::config::ExecConfig;
use crate::error::Result;
use crate::outputs::{guess_mime_type, is_source_file};

/// One file slated to land in the sandbox, resolved from its metadata.
pub struct ResolvedMount {
    pub session_id: SessionId,
    pub file_id: FileId,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Resolves the request's explicit file list, or — when none was given —
/// auto-mounts every file already on the resolved session (§4.6 step 4),
/// capped at `max_files_per_session` (§9 Design Notes).
pub async fn resolve_mounts(
    files: &FileStore,
    session_id: &SessionId,
    requested: &Option<Vec<FileRefRequest>>,
    config: &ExecConfig,
) -> Result<Vec<ResolvedMount>> {
    let mut mounts = Vec::new();
    let mut seen: HashSet<FileId> = HashSet::new();

    if let Some(requested) = requested {
        for file_ref in requested {
            if !seen.insert(file_ref.id) {
                continue;
            }
            let Some(metadata) = resolve_file_ref(files, file_ref).await? else {
                continue;
            };
            let bytes = files.get_bytes(&metadata.object_key).await?.unwrap_or_default();
            mounts.push(ResolvedMount {
                session_id: metadata.session_id,
                file_id: metadata.id,
                filename: metadata.filename,
                bytes: bytes.to_vec(),
            });
        }
        return Ok(mounts);
    }

    let session_files = files.list_session_files(session_id).await?;
    if session_files.len() > config.max_files_per_session {
        return Err(crate::error::ExecError::Validation(format!(
            "session {} has {} files, which exceeds the auto-mount cap of {}; narrow the request with an explicit file list",
            session_id.as_str(),
            session_files.len(),
            config.max_files_per_session
        )));
    }
    for metadata in session_files {
        if !seen.insert(metadata.id) {
            continue;
        }
        let bytes = files.get_bytes(&metadata.object_key).await?.unwrap_or_default();
        mounts.push(ResolvedMount {
            session_id: metadata.session_id,
            file_id: metadata.id,
            filename: metadata.filename,
            bytes: bytes.to_vec(),
        });
    }
    Ok(mounts)
}

async fn resolve_file_ref(files: &FileStore, file_ref: &FileRefRequest) -> Result<Option<StoredFile>> {
    if let Some(metadata) = files.get_metadata(&file_ref.session_id, &file_ref.id).await? {
        return Ok(Some(metadata));
    }
    Ok(files.find_by_name(&file_ref.session_id, &file_ref.name).await?)
}

/// §4.6 step 3: if a requested file is flagged `restore_state` and carries a
/// recorded `state_hash`, that hash takes priority over the session's own
/// state for this execution. Returns the first such hash found.
pub async fn resolve_restore_state_hash(files: &FileStore, requested: &Option<Vec<FileRefRequest>>) -> Result<Option<String>> {
    let Some(requested) = requested else {
        return Ok(None);
    };
    for file_ref in requested {
        if !file_ref.restore_state {
            continue;
        }
        if let Some(metadata) = resolve_file_ref(files, file_ref).await? {
            if metadata.state_hash.is_some() {
                return Ok(metadata.state_hash);
            }
        }
    }
    Ok(None)
}

/// Writes resolved mounts into the sandbox's data directory; an unreachable
/// file becomes a zero-byte placeholder so the name is still openable
/// (§4.6 step 4).
pub fn write_mounts(manager: &SandboxManager, descriptor: &SandboxDescriptor, mounts: &[ResolvedMount]) {
    for mount in mounts {
        if let Err(e) = manager.write_file(descriptor, &mount.filename, &mount.bytes) {
            warn!(filename = %mount.filename, error = %e, "failed to write mounted file into sandbox");
        }
    }
}

/// Rewrites the blob-store copy and metadata of every mounted file that is
/// writable by this session (§4.6 step 9). Files from other sessions and
/// agent files are left untouched.
pub async fn update_mounted_files(
    files: &FileStore,
    manager: &SandboxManager,
    descriptor: &SandboxDescriptor,
    mounts: &[ResolvedMount],
    session_id: &SessionId,
    execution_id: ExecutionId,
    state_hash: Option<&str>,
) {
    for mount in mounts {
        if &mount.session_id != session_id {
            continue;
        }
        let Ok(Some(mut metadata)) = files.get_metadata(&mount.session_id, &mount.file_id).await else {
            continue;
        };
        if !metadata.is_writable_by(session_id) {
            continue;
        }
        let Ok(Some(bytes)) = manager.read_file(descriptor, &mount.filename) else {
            continue;
        };
        if let Err(e) = files.put_bytes(&metadata.object_key, bytes.clone().into()).await {
            warn!(filename = %mount.filename, error = %e, "failed to persist updated mounted file");
            continue;
        }
        metadata.size = bytes.len() as u64;
        metadata.state_hash = state_hash.map(str::to_string);
        metadata.execution_id = Some(execution_id);
        metadata.last_used_at = Some(Utc::now());
        if let Err(e) = files.put_metadata(&metadata).await {
            warn!(filename = %mount.filename, error = %e, "failed to persist updated mounted file metadata");
        }
    }
}

/// Walks the sandbox's data directory for files user code created, excluding
/// the source file and anything already tracked as a mount (§4.6 step 10).
pub async fn harvest_generated_files(
    files: &FileStore,
    manager: &SandboxManager,
    descriptor: &SandboxDescriptor,
    mounted_filenames: &HashSet<String>,
    source_filename: &str,
    session_id: &SessionId,
    execution_id: ExecutionId,
    state_hash: Option<&str>,
    config: &ExecConfig,
) -> Vec<(FileId, String)> {
    let mut refs = Vec::new();
    let entries = match std::fs::read_dir(descriptor.data_dir()) {
        Ok(entries) => entries,
        Err(_) => return refs,
    };

    for entry in entries.flatten() {
        if refs.len() >= config.max_output_files {
            break;
        }
        let Ok(file_type) = entry.file_type() else { continue };
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_source_file(&name, source_filename) || mounted_filenames.contains(&name) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if meta.len() > config.max_file_size_bytes() {
            continue;
        }

        let Ok(Some(bytes)) = manager.read_file(descriptor, Path::new(&name).to_str().unwrap_or(&name)) else {
            continue;
        };

        let file_id = FileId::new();
        let object_key = format!("sessions/{}/outputs/{}", session_id.as_str(), file_id);
        if let Err(e) = files.put_bytes(&object_key, bytes.clone().into()).await {
            warn!(filename = %name, error = %e, "failed to store generated file");
            continue;
        }

        let stored = StoredFile {
            id: file_id,
            session_id: session_id.clone(),
            filename: name.clone(),
            object_key,
            size: bytes.len() as u64,
            content_type: guess_mime_type(&name),
            created_at: Utc::now(),
            state_hash: state_hash.map(str::to_string),
            execution_id: Some(execution_id),
            last_used_at: Some(Utc::now()),
            is_agent_file: false,
        };
        if let Err(e) = files.put_metadata(&stored).await {
            warn!(filename = %name, error = %e, "failed to store generated file metadata");
            continue;
        }

        refs.push((file_id, name));
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellbox_protocol::Language;
    use cellbox_sandbox::SandboxManager;
    use cellbox_store::{InMemoryColdStore, InMemoryHotStore};
    use std::sync::Arc;

    fn file_store() -> FileStore {
        FileStore::new(Arc::new(InMemoryHotStore::new()), Arc::new(InMemoryColdStore::new()))
    }

    async fn seed_file(store: &FileStore, session_id: &SessionId, name: &str, bytes: &[u8]) -> cellbox_protocol::StoredFile {
        let file = cellbox_protocol::StoredFile {
            id: cellbox_protocol::FileId::new(),
            session_id: session_id.clone(),
            filename: name.to_string(),
            object_key: format!("sessions/{}/uploads/{name}", session_id.as_str()),
            size: bytes.len() as u64,
            content_type: "text/plain".to_string(),
            created_at: chrono::Utc::now(),
            state_hash: None,
            execution_id: None,
            last_used_at: None,
            is_agent_file: false,
        };
        store.put_metadata(&file).await.unwrap();
        store.put_bytes(&file.object_key, bytes.to_vec().into()).await.unwrap();
        file
    }

    #[tokio::test]
    async fn resolve_mounts_auto_mounts_every_session_file_when_none_are_requested() {
        let store = file_store();
        let session_id = SessionId::new();
        seed_file(&store, &session_id, "a.txt", b"a").await;
        seed_file(&store, &session_id, "b.txt", b"b").await;

        let mounts = resolve_mounts(&store, &session_id, &None, &ExecConfig::default()).await.unwrap();
        assert_eq!(mounts.len(), 2);
    }

    #[tokio::test]
    async fn resolve_mounts_rejects_auto_mount_past_the_session_file_cap() {
        let store = file_store();
        let session_id = SessionId::new();
        for i in 0..5 {
            seed_file(&store, &session_id, &format!("f{i}.txt"), b"x").await;
        }
        let mut config = ExecConfig::default();
        config.max_files_per_session = 2;

        let err = resolve_mounts(&store, &session_id, &None, &config).await.unwrap_err();
        assert!(matches!(err, crate::error::ExecError::Validation(_)));
    }

    #[tokio::test]
    async fn write_mounts_places_file_bytes_in_the_sandbox_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path());
        let descriptor = manager.create(Language::Py, None).unwrap();
        let session_id = SessionId::new();
        let mounts = vec![ResolvedMount {
            session_id: session_id.clone(),
            file_id: cellbox_protocol::FileId::new(),
            filename: "input.csv".to_string(),
            bytes: b"1,2,3".to_vec(),
        }];

        write_mounts(&manager, &descriptor, &mounts);

        let read_back = manager.read_file(&descriptor, "input.csv").unwrap().unwrap();
        assert_eq!(read_back, b"1,2,3");
    }

    #[tokio::test]
    async fn harvest_generated_files_skips_the_source_file_and_mounted_names() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path());
        let descriptor = manager.create(Language::Py, None).unwrap();
        manager.write_file(&descriptor, "code.py", b"print(1)").unwrap();
        manager.write_file(&descriptor, "input.csv", b"1,2").unwrap();
        manager.write_file(&descriptor, "output.csv", b"3,4").unwrap();

        let store = file_store();
        let session_id = SessionId::new();
        let mut mounted = HashSet::new();
        mounted.insert("input.csv".to_string());

        let refs = harvest_generated_files(
            &store,
            &manager,
            &descriptor,
            &mounted,
            "code.py",
            &session_id,
            ExecutionId::new(),
            None,
            &ExecConfig::default(),
        )
        .await;

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].1, "output.csv");
    }

    #[tokio::test]
    async fn resolve_restore_state_hash_prefers_a_flagged_file_with_a_recorded_hash() {
        let store = file_store();
        let session_id = SessionId::new();
        let mut file = seed_file(&store, &session_id, "checkpoint.pkl", b"ignored").await;
        file.state_hash = Some("deadbeefdeadbeef".to_string());
        store.put_metadata(&file).await.unwrap();

        let requested = Some(vec![FileRefRequest {
            id: file.id,
            session_id: session_id.clone(),
            name: "checkpoint.pkl".to_string(),
            restore_state: true,
        }]);

        let hash = resolve_restore_state_hash(&store, &requested).await.unwrap();
        assert_eq!(hash.as_deref(), Some("deadbeefdeadbeef"));
    }

    #[tokio::test]
    async fn resolve_restore_state_hash_ignores_unflagged_files() {
        let store = file_store();
        let session_id = SessionId::new();
        let mut file = seed_file(&store, &session_id, "checkpoint.pkl", b"ignored").await;
        file.state_hash = Some("deadbeefdeadbeef".to_string());
        store.put_metadata(&file).await.unwrap();

        let requested = Some(vec![FileRefRequest {
            id: file.id,
            session_id: session_id.clone(),
            name: "checkpoint.pkl".to_string(),
            restore_state: false,
        }]);

        let hash = resolve_restore_state_hash(&store, &requested).await.unwrap();
        assert_eq!(hash, None);
    }

    #[tokio::test]
    async fn update_mounted_files_skips_files_not_writable_by_the_session() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path());
        let descriptor = manager.create(Language::Py, None).unwrap();
        manager.write_file(&descriptor, "shared.csv", b"changed").unwrap();

        let store = file_store();
        let owner_session = SessionId::new();
        let other_session = SessionId::new();
        let agent_file = seed_file(&store, &owner_session, "shared.csv", b"original").await;

        let mounts = vec![ResolvedMount {
            session_id: owner_session.clone(),
            file_id: agent_file.id,
            filename: "shared.csv".to_string(),
            bytes: b"original".to_vec(),
        }];

        update_mounted_files(&store, &manager, &descriptor, &mounts, &other_session, ExecutionId::new(), None).await;

        let reloaded = store.get_metadata(&owner_session, &agent_file.id).await.unwrap().unwrap();
        assert_eq!(reloaded.size, 8);
    }
}
