//! Session records (§6: `sessions:<session_id>`, `sessions:index`). The
//! index is consulted only by the external cleanup collaborator that expires
//! idle sessions; the orchestrator itself only ever reads/writes one session
//! record at a time.

use std::sync::Arc;

use cellbox_protocol::{Session, SessionId};

use crate::error::Result;
use crate::hot::HotStore;

pub struct SessionStore {
    hot: Arc<dyn HotStore>,
}

impl SessionStore {
    pub fn new(hot: Arc<dyn HotStore>) -> Self {
        Self { hot }
    }

    pub async fn put(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)?;
        self.hot.set(&record_key(&session.id), &json, None).await?;
        self.hot.set_add("sessions:index", session.id.as_str()).await?;
        Ok(())
    }

    pub async fn get(&self, session_id: &SessionId) -> Result<Option<Session>> {
        match self.hot.get(&record_key(session_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn remove_from_index(&self, session_id: &SessionId) -> Result<()> {
        self.hot.set_remove("sessions:index", session_id.as_str()).await
    }

    pub async fn list_indexed_ids(&self) -> Result<Vec<String>> {
        self.hot.set_members("sessions:index").await
    }
}

fn record_key(session_id: &SessionId) -> String {
    format!("sessions:{}", session_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hot::InMemoryHotStore;

    #[tokio::test]
    async fn put_then_get_round_trips_a_session() {
        let store = SessionStore::new(Arc::new(InMemoryHotStore::new()));
        let session = Session::new(SessionId::new());
        store.put(&session).await.unwrap();

        let loaded = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
    }

    #[tokio::test]
    async fn index_tracks_and_releases_session_ids() {
        let store = SessionStore::new(Arc::new(InMemoryHotStore::new()));
        let session = Session::new(SessionId::new());
        store.put(&session).await.unwrap();
        assert!(store.list_indexed_ids().await.unwrap().contains(&session.id.as_str().to_string()));

        store.remove_from_index(&session.id).await.unwrap();
        assert!(!store.list_indexed_ids().await.unwrap().contains(&session.id.as_str().to_string()));
    }
}
