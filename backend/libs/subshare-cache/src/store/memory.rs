//! In-process store with the same sliding semantics as Redis.

use super::CacheStore;
use crate::{CacheError, CacheResult};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
struct Entry {
    data: Vec<u8>,
    sliding: Duration,
    expires_at: Instant,
}

#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live entry exists. Does not slide the expiry.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| e.expires_at > Instant::now())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let hit = match self.entries.get_mut(key) {
            Some(mut entry) if entry.expires_at > now => {
                entry.expires_at = now + entry.sliding;
                Some(entry.data.clone())
            }
            Some(_) => None,
            None => return Ok(None),
        };

        if hit.is_none() {
            self.entries.remove_if(key, |_, e| e.expires_at <= now);
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: &[u8], sliding_ttl: Duration) -> CacheResult<()> {
        if sliding_ttl.is_zero() {
            return Err(CacheError::Configuration("sliding ttl must be positive".into()));
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                data: value.to_vec(),
                sliding: sliding_ttl,
                expires_at: Instant::now() + sliding_ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, e)| e.expires_at > now)
            .unwrap_or(false))
    }

    async fn delete_many(&self, keys: &[&str]) -> CacheResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.delete(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
