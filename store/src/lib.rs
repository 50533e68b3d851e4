pub mod cold;
pub mod error;
pub mod files;
pub mod hot;
pub mod sessions;
pub mod state;

pub use cold::{ColdStore, InMemoryColdStore, S3ColdStore};
pub use error::{Result, StoreError};
pub use files::FileStore;
pub use hot::{HotStore, InMemoryHotStore, RedisHotStore};
pub use sessions::SessionStore;
pub use state::{StateStore, StateStoreConfig};
