#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("hot store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cold store error: {0}")]
    Blob(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
