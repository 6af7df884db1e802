//! Process-local lock provider with the same TTL semantics as the Redis one.

use super::{LockProvider, LockToken};
use crate::CacheResult;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Default)]
pub struct MemoryLockProvider {
    locks: Arc<DashMap<String, (LockToken, Instant)>>,
}

impl MemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, resource: &str) -> bool {
        self.locks
            .get(resource)
            .map(|held| held.1 > Instant::now())
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl LockProvider for MemoryLockProvider {
    async fn try_acquire(&self, resource: &str, ttl: Duration) -> CacheResult<Option<LockToken>> {
        let now = Instant::now();
        let token = LockToken::generate();

        match self.locks.entry(resource.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().1 > now {
                    return Ok(None);
                }
                held.insert((token.clone(), now + ttl));
            }
            Entry::Vacant(slot) => {
                slot.insert((token.clone(), now + ttl));
            }
        }
        Ok(Some(token))
    }

    async fn release(&self, resource: &str, token: &LockToken) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .locks
            .remove_if(resource, |_, (owner, expires_at)| {
                owner == token && *expires_at > now
            })
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exclusive_until_released() {
        let locks = MemoryLockProvider::new();
        let ttl = Duration::from_secs(10);

        let token = locks.try_acquire("lock:a", ttl).await.unwrap().unwrap();
        assert!(locks.try_acquire("lock:a", ttl).await.unwrap().is_none());
        // Other names are independent
        assert!(locks.try_acquire("lock:b", ttl).await.unwrap().is_some());

        assert!(locks.release("lock:a", &token).await.unwrap());
        assert!(locks.try_acquire("lock:a", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_foreign_token_cannot_release() {
        let locks = MemoryLockProvider::new();
        let _token = locks
            .try_acquire("lock:a", Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();

        assert!(!locks.release("lock:a", &LockToken::generate()).await.unwrap());
        assert!(locks.is_locked("lock:a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_frees_crashed_holder() {
        let locks = MemoryLockProvider::new();
        let stale = locks
            .try_acquire("lock:a", Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!locks.is_locked("lock:a"));

        let fresh = locks
            .try_acquire("lock:a", Duration::from_secs(2))
            .await
            .unwrap();
        assert!(fresh.is_some());
        // The expired holder must not free the new owner's lock
        assert!(!locks.release("lock:a", &stale).await.unwrap());
        assert!(locks.is_locked("lock:a"));
    }
}
