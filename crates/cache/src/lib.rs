pub mod cache_aside;
pub mod memory;
pub mod redis_cache;
pub mod store;

pub use cache_aside::{CacheAside, INVALIDATION_TIMEOUT};
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;
pub use store::{KeyValueCache, LeaseStore, MappingStore};

use common::DeadlineExceeded;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache backend unavailable")]
    Unavailable,

    #[error("Cache call exceeded its deadline")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DeadlineExceeded> for CacheError {
    fn from(_: DeadlineExceeded) -> Self {
        CacheError::Timeout
    }
}
