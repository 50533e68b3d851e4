//! File metadata (§6: `files:<session_id>:<file_id>`, `session_files:<session_id>`)
//! and the uploaded/generated file bytes themselves, which live in cold
//! storage under `sessions/<session_id>/uploads/<file_id>` and
//! `sessions/<session_id>/outputs/<file_id>`.

use std::sync::Arc;

use bytes::Bytes;
use cellbox_protocol::{FileId, SessionId, StoredFile};

use crate::cold::ColdStore;
use crate::error::Result;
use crate::hot::HotStore;

pub struct FileStore {
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
}

impl FileStore {
    pub fn new(hot: Arc<dyn HotStore>, cold: Arc<dyn ColdStore>) -> Self {
        Self { hot, cold }
    }

    pub async fn put_metadata(&self, file: &StoredFile) -> Result<()> {
        let key = metadata_key(&file.session_id, &file.id);
        let json = serde_json::to_string(file)?;
        self.hot.set(&key, &json, None).await?;
        self.hot
            .set_add(&session_index_key(&file.session_id), &file.id.to_string())
            .await?;
        Ok(())
    }

    pub async fn get_metadata(&self, session_id: &SessionId, file_id: &FileId) -> Result<Option<StoredFile>> {
        let key = metadata_key(session_id, file_id);
        match self.hot.get(&key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_name(&self, session_id: &SessionId, name: &str) -> Result<Option<StoredFile>> {
        for id in self.list_session_file_ids(session_id).await? {
            let file_id: FileId = match id.parse() {
                Ok(id) => id,
                Err(_) => continue,
            };
            if let Some(file) = self.get_metadata(session_id, &file_id).await? {
                if file.filename == name {
                    return Ok(Some(file));
                }
            }
        }
        Ok(None)
    }

    pub async fn list_session_files(&self, session_id: &SessionId) -> Result<Vec<StoredFile>> {
        let mut files = Vec::new();
        for id in self.list_session_file_ids(session_id).await? {
            let Ok(file_id) = id.parse::<FileId>() else {
                continue;
            };
            if let Some(file) = self.get_metadata(session_id, &file_id).await? {
                files.push(file);
            }
        }
        Ok(files)
    }

    async fn list_session_file_ids(&self, session_id: &SessionId) -> Result<Vec<String>> {
        self.hot.set_members(&session_index_key(session_id)).await
    }

    /// Idempotent: deleting metadata for an already-missing file is not an
    /// error (§9 Open Questions leaves the blob-store side of this
    /// unspecified; the metadata side is pinned down here as a no-op).
    pub async fn delete_metadata(&self, session_id: &SessionId, file_id: &FileId) -> Result<()> {
        self.hot.delete(&metadata_key(session_id, file_id)).await?;
        self.hot
            .set_remove(&session_index_key(session_id), &file_id.to_string())
            .await?;
        Ok(())
    }

    pub async fn put_bytes(&self, object_key: &str, bytes: Bytes) -> Result<()> {
        self.cold.put(object_key, bytes).await
    }

    pub async fn get_bytes(&self, object_key: &str) -> Result<Option<Bytes>> {
        self.cold.get(object_key).await
    }
}

fn metadata_key(session_id: &SessionId, file_id: &FileId) -> String {
    format!("files:{}:{}", session_id.as_str(), file_id)
}

fn session_index_key(session_id: &SessionId) -> String {
    format!("session_files:{}", session_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cold::InMemoryColdStore;
    use crate::hot::InMemoryHotStore;

    fn store() -> FileStore {
        FileStore::new(Arc::new(InMemoryHotStore::new()), Arc::new(InMemoryColdStore::new()))
    }

    fn sample_file(session_id: &SessionId, name: &str) -> StoredFile {
        StoredFile {
            id: FileId::new(),
            session_id: session_id.clone(),
            filename: name.to_string(),
            object_key: format!("sessions/{}/uploads/x", session_id.as_str()),
            size: 3,
            content_type: "text/plain".to_string(),
            created_at: chrono::Utc::now(),
            state_hash: None,
            execution_id: None,
            last_used_at: None,
            is_agent_file: false,
        }
    }

    #[tokio::test]
    async fn put_then_get_metadata_round_trips() {
        let store = store();
        let session = SessionId::new();
        let file = sample_file(&session, "hello.txt");
        store.put_metadata(&file).await.unwrap();

        let loaded = store.get_metadata(&session, &file.id).await.unwrap().unwrap();
        assert_eq!(loaded.filename, "hello.txt");
    }

    #[tokio::test]
    async fn find_by_name_searches_the_session_index() {
        let store = store();
        let session = SessionId::new();
        let file = sample_file(&session, "data.csv");
        store.put_metadata(&file).await.unwrap();

        let found = store.find_by_name(&session, "data.csv").await.unwrap().unwrap();
        assert_eq!(found.id, file.id);
        assert!(store.find_by_name(&session, "nope.csv").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_metadata_is_idempotent() {
        let store = store();
        let session = SessionId::new();
        let file = sample_file(&session, "x.txt");
        store.put_metadata(&file).await.unwrap();
        store.delete_metadata(&session, &file.id).await.unwrap();
        store.delete_metadata(&session, &file.id).await.unwrap();
        assert!(store.get_metadata(&session, &file.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_session_files_reflects_additions_and_removals() {
        let store = store();
        let session = SessionId::new();
        let a = sample_file(&session, "a.txt");
        let b = sample_file(&session, "b.txt");
        store.put_metadata(&a).await.unwrap();
        store.put_metadata(&b).await.unwrap();
        assert_eq!(store.list_session_files(&session).await.unwrap().len(), 2);

        store.delete_metadata(&session, &a.id).await.unwrap();
        let remaining = store.list_session_files(&session).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
    }
}
