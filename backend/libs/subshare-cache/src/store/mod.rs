//! Cache store adapter
//!
//! Raw byte payloads by string key with a sliding expiration window. No
//! business logic lives here. `Ok(None)` means the key is absent; an `Err`
//! means the store could not answer and must not be read as a miss.

mod memory;
mod redis_store;

pub use self::memory::MemoryCacheStore;
pub use self::redis_store::RedisCacheStore;

use crate::CacheResult;
use std::time::Duration;

#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a payload, resetting its sliding window on a hit.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Write a payload that expires after `sliding_ttl` without access.
    async fn set(&self, key: &str, value: &[u8], sliding_ttl: Duration) -> CacheResult<()>;

    /// Delete one key. Returns whether it existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Delete several keys, returning how many existed. Absent keys are not
    /// an error.
    async fn delete_many(&self, keys: &[&str]) -> CacheResult<usize>;
}
