//! The "blob store (S3-compatible or Azure-Blob; pluggable)" of §6. Only the
//! operations the core actually consumes are exposed: put/get/delete/list
//! and a head for size. Presigned-url generation lives on the server crate's
//! upload/download endpoints, not here, since it is an HTTP-layer concern.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StoreError};

#[async_trait]
pub trait ColdStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;
    async fn head_size(&self, key: &str) -> Result<Option<u64>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn list_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

pub struct S3ColdStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ColdStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ColdStore for S3ColdStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(bytes.into())
            .send()
            .await
            .map_err(|e| StoreError::Blob(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StoreError::Blob(e.to_string()))?;
                Ok(Some(data.into_bytes()))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(StoreError::Blob(e.to_string())),
        }
    }

    async fn head_size(&self, key: &str) -> Result<Option<u64>> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => Ok(output.content_length().map(|n| n as u64)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(StoreError::Blob(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // Idempotent: a delete of an already-missing key is not an error
        // (§9 Open Questions discusses this explicitly for file metadata;
        // the same idempotence is extended to the blob layer itself).
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Blob(e.to_string()))?;
        Ok(())
    }

    async fn list_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }
            let output = req.send().await.map_err(|e| StoreError::Blob(e.to_string()))?;
            keys.extend(output.contents().iter().filter_map(|o| o.key().map(str::to_string)));
            if output.is_truncated().unwrap_or(false) {
                continuation = output.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(keys)
    }
}

fn is_not_found<E: std::fmt::Debug>(err: &E) -> bool {
    format!("{err:?}").contains("NoSuchKey") || format!("{err:?}").contains("NotFound")
}

/// In-process fake used for unit tests.
#[derive(Default)]
pub struct InMemoryColdStore {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl InMemoryColdStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ColdStore for InMemoryColdStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn head_size(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.objects.lock().unwrap().get(key).map(|b| b.len() as u64))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_cold_store_round_trips_bytes() {
        let store = InMemoryColdStore::new();
        store.put("states/s1/state.dat", Bytes::from_static(b"abc")).await.unwrap();
        let read = store.get("states/s1/state.dat").await.unwrap().unwrap();
        assert_eq!(read, Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn delete_of_a_missing_key_is_not_an_error() {
        let store = InMemoryColdStore::new();
        store.delete("does/not/exist").await.unwrap();
    }

    #[tokio::test]
    async fn list_with_prefix_only_returns_matching_keys() {
        let store = InMemoryColdStore::new();
        store.put("states/s1/state.dat", Bytes::from_static(b"a")).await.unwrap();
        store.put("states/s2/state.dat", Bytes::from_static(b"b")).await.unwrap();
        let keys = store.list_with_prefix("states/s1").await.unwrap();
        assert_eq!(keys, vec!["states/s1/state.dat".to_string()]);
    }
}
