//! State storage (§4.5): a hot, TTL-keyed store backed by `HotStore`, and a
//! cold, long-retention blob store backed by `ColdStore`. Hot entries are
//! always base64 text (the wire form clients and the REPL exchange); cold
//! entries are the raw decoded bytes (what actually gets hashed).

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use cellbox_protocol::{state::hash16, SessionId};
use tracing::warn;

use crate::cold::ColdStore;
use crate::error::Result;
use crate::hot::HotStore;

#[derive(Debug, Clone)]
pub struct StateStoreConfig {
    pub hot_ttl: Duration,
    pub archival_enabled: bool,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            hot_ttl: Duration::from_secs(2 * 60 * 60),
            archival_enabled: true,
        }
    }
}

pub struct StateStore {
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
    config: StateStoreConfig,
}

impl StateStore {
    pub fn new(hot: Arc<dyn HotStore>, cold: Arc<dyn ColdStore>, config: StateStoreConfig) -> Self {
        Self { hot, cold, config }
    }

    /// Decodes `state_b64`, computes `hash16`, and writes both the
    /// session-keyed and hash-keyed hot entries. Returns `(success, hash16)`
    /// per §4.5; a failed secondary write degrades `success` to `false` but
    /// still returns the hash so the caller can log it.
    pub async fn save(&self, session_id: &SessionId, state_b64: &str) -> Result<(bool, String)> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(state_b64)
            .unwrap_or_default();
        let hash = hash16(&raw);
        let ttl = Some(self.config.hot_ttl);

        let session_key = format!("state:{}", session_id.as_str());
        let hash_key = format!("state:by_hash:{hash}");

        let session_write = self.hot.set(&session_key, state_b64, ttl).await;
        let hash_write = self.hot.set(&hash_key, state_b64, ttl).await;

        if let Err(e) = &session_write {
            warn!(session_id = %session_id, error = %e, "failed to write session-keyed state");
        }
        if let Err(e) = &hash_write {
            warn!(hash16 = %hash, error = %e, "failed to write hash-keyed state");
        }

        Ok((session_write.is_ok() && hash_write.is_ok(), hash))
    }

    /// A client-uploaded state blob (§3 `state:upload_marker:<session_id>`):
    /// writes the session- and hash-keyed hot entries exactly like `save`,
    /// then sets the marker so the *next* execution on this session prefers
    /// this blob over whatever is already in `state:<session_id>` (the
    /// marker is cleared after that one use by `load_for_session`).
    pub async fn upload(&self, session_id: &SessionId, state_b64: &str) -> Result<String> {
        let (_, hash) = self.save(session_id, state_b64).await?;
        let marker_key = format!("state:upload_marker:{}", session_id.as_str());
        self.hot.set(&marker_key, "1", Some(self.config.hot_ttl)).await?;
        Ok(hash)
    }

    /// Priority: upload marker (clears after use) → hot session key → cold
    /// archive (written back to hot on hit) (§4.5).
    pub async fn load_for_session(&self, session_id: &SessionId) -> Result<Option<String>> {
        let session_key = format!("state:{}", session_id.as_str());
        let marker_key = format!("state:upload_marker:{}", session_id.as_str());

        if self.hot.exists(&marker_key).await? {
            let value = self.hot.get(&session_key).await?;
            self.hot.delete(&marker_key).await?;
            return Ok(value);
        }

        if let Some(value) = self.hot.get(&session_key).await? {
            return Ok(Some(value));
        }

        if !self.config.archival_enabled {
            return Ok(None);
        }

        self.restore_state(session_id).await
    }

    pub async fn load_by_hash(&self, hash16: &str) -> Result<Option<String>> {
        let hash_key = format!("state:by_hash:{hash16}");
        if let Some(value) = self.hot.get(&hash_key).await? {
            return Ok(Some(value));
        }
        if !self.config.archival_enabled {
            return Ok(None);
        }
        let cold_key = format!("states/by_hash/{hash16}.dat");
        match self.cold.get(&cold_key).await? {
            Some(raw) => Ok(Some(base64::engine::general_purpose::STANDARD.encode(raw))),
            None => Ok(None),
        }
    }

    /// Called by the external cleanup/archival collaborator once a
    /// session's hot entry has gone idle past the archive threshold.
    pub async fn archive_state(&self, session_id: &SessionId, state_b64: &str) -> Result<()> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(state_b64)
            .unwrap_or_default();
        let cold_key = format!("states/{}/state.dat", session_id.as_str());
        self.cold.put(&cold_key, raw.into()).await
    }

    /// Reads the cold archive for a session and writes it back to hot so
    /// the next execution is fast, returning the base64 form either way.
    pub async fn restore_state(&self, session_id: &SessionId) -> Result<Option<String>> {
        let cold_key = format!("states/{}/state.dat", session_id.as_str());
        let Some(raw) = self.cold.get(&cold_key).await? else {
            return Ok(None);
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(&raw);
        let session_key = format!("state:{}", session_id.as_str());
        self.hot.set(&session_key, &encoded, Some(self.config.hot_ttl)).await?;
        Ok(Some(encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cold::InMemoryColdStore;
    use crate::hot::InMemoryHotStore;

    fn store() -> StateStore {
        StateStore::new(
            Arc::new(InMemoryHotStore::new()),
            Arc::new(InMemoryColdStore::new()),
            StateStoreConfig::default(),
        )
    }

    #[tokio::test]
    async fn save_then_load_for_session_round_trips() {
        let store = store();
        let session = SessionId::new();
        let payload = base64::engine::general_purpose::STANDARD.encode(b"hello state");

        let (success, hash) = store.save(&session, &payload).await.unwrap();
        assert!(success);
        assert_eq!(hash.len(), 16);

        let loaded = store.load_for_session(&session).await.unwrap();
        assert_eq!(loaded.as_deref(), Some(payload.as_str()));
    }

    #[tokio::test]
    async fn load_by_hash_finds_content_addressed_state() {
        let store = store();
        let session = SessionId::new();
        let payload = base64::engine::general_purpose::STANDARD.encode(b"content addressed");
        let (_, hash) = store.save(&session, &payload).await.unwrap();

        let loaded = store.load_by_hash(&hash).await.unwrap();
        assert_eq!(loaded.as_deref(), Some(payload.as_str()));
    }

    #[tokio::test]
    async fn upload_marker_takes_precedence_exactly_once() {
        let store = store();
        let session = SessionId::new();
        let payload = base64::engine::general_purpose::STANDARD.encode(b"uploaded blob");
        store.save(&session, &payload).await.unwrap();
        store
            .hot
            .set(&format!("state:upload_marker:{}", session.as_str()), "1", None)
            .await
            .unwrap();

        let first = store.load_for_session(&session).await.unwrap();
        assert_eq!(first.as_deref(), Some(payload.as_str()));
        assert!(!store.hot.exists(&format!("state:upload_marker:{}", session.as_str())).await.unwrap());
    }

    #[tokio::test]
    async fn upload_sets_the_marker_so_the_next_load_prefers_it() {
        let store = store();
        let session = SessionId::new();
        let stale = base64::engine::general_purpose::STANDARD.encode(b"stale");
        let uploaded = base64::engine::general_purpose::STANDARD.encode(b"freshly uploaded");
        store.save(&session, &stale).await.unwrap();

        store.upload(&session, &uploaded).await.unwrap();

        let loaded = store.load_for_session(&session).await.unwrap();
        assert_eq!(loaded.as_deref(), Some(uploaded.as_str()));
        // Marker is single-use: a second load falls back to the session key.
        let second = store.load_for_session(&session).await.unwrap();
        assert_eq!(second.as_deref(), Some(uploaded.as_str()));
    }

    #[tokio::test]
    async fn cold_archive_is_read_and_written_back_to_hot() {
        let store = store();
        let session = SessionId::new();
        let payload = base64::engine::general_purpose::STANDARD.encode(b"archived state");
        store.archive_state(&session, &payload).await.unwrap();

        let loaded = store.load_for_session(&session).await.unwrap();
        assert_eq!(loaded.as_deref(), Some(payload.as_str()));

        let refreshed_hot = store.hot.get(&format!("state:{}", session.as_str())).await.unwrap();
        assert_eq!(refreshed_hot.as_deref(), Some(payload.as_str()));
    }
}
