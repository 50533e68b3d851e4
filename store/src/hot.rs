//! The "key-value store (Redis-compatible)" of §6: short-TTL strings plus the
//! small set operations needed for `session_files:<session_id>` and
//! `sessions:index`. Abstracted behind a trait so the orchestrator and the
//! state/file stores never depend on `redis` directly — only this crate and
//! its test fakes do (mirrors the teacher's preference for narrow traits at
//! storage seams over threading a concrete client type through call sites).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::Result;

#[async_trait]
pub trait HotStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn set_add(&self, key: &str, member: &str) -> Result<()>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<()>;
}

pub struct RedisHotStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisHotStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl HotStore for RedisHotStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await?;
            }
            None => {
                conn.set::<_, _, ()>(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        Ok(conn.exists(key).await?)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.sadd::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.srem::<_, _, ()>(key, member).await?;
        Ok(())
    }
}

#[derive(Default)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-process fake used by unit tests across `cellbox-store`, `cellbox-pool`,
/// and `cellbox-exec` so their tests don't need a running Redis.
#[derive(Default)]
pub struct InMemoryHotStore {
    strings: Mutex<HashMap<String, Entry>>,
    sets: Mutex<HashMap<String, std::collections::HashSet<String>>>,
}

impl InMemoryHotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HotStore for InMemoryHotStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut strings = self.strings.lock().unwrap();
        if let Some(entry) = strings.get(key) {
            if entry.expires_at.is_some_and(|at| Instant::now() >= at) {
                strings.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.strings.lock().unwrap().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.strings.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.sets
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .lock()
            .unwrap()
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        if let Some(set) = self.sets.lock().unwrap().get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips_a_value() {
        let store = InMemoryHotStore::new();
        store.set("state:abc", "payload", None).await.unwrap();
        assert_eq!(store.get("state:abc").await.unwrap().as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn in_memory_store_expires_entries_past_their_ttl() {
        let store = InMemoryHotStore::new();
        store
            .set("state:abc", "payload", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("state:abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_store_tracks_set_membership() {
        let store = InMemoryHotStore::new();
        store.set_add("session_files:s1", "f1").await.unwrap();
        store.set_add("session_files:s1", "f2").await.unwrap();
        store.set_remove("session_files:s1", "f1").await.unwrap();
        let members = store.set_members("session_files:s1").await.unwrap();
        assert_eq!(members, vec!["f2".to_string()]);
    }
}
