//! Invalidation completeness and bus behaviour against real stores.
//!
//! Redis-backed tests require a running Redis instance.
//! Run with: cargo test --test integration_test -- --ignored

use cache_invalidation::{
    InvalidationError, PublishError, Signal, SignalBus, SignalHandler, SignalKind,
};
use redis_utils::RedisPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subshare_cache::store::{MemoryCacheStore, RedisCacheStore};
use subshare_cache::views::MemberRole;
use subshare_cache::{CacheError, CacheResult, CacheStore, CancellationToken};

const REDIS_URL: &str = "redis://127.0.0.1:6379";
const TTL: Duration = Duration::from_secs(60);

/// Every key any signal below can touch, for users U1/U2, group G1 and
/// subscription S1.
const ALL_KEYS: [&str; 8] = [
    "G1:GroupDetail",
    "U1:user_groups_list",
    "U2:user_groups_list",
    "U1:upcoming_bills",
    "U2:upcoming_bills",
    "S1:SubscriptionDetail",
    "U1:UserDetail",
    "G2:GroupDetail",
];

async fn seeded_store() -> MemoryCacheStore {
    let store = MemoryCacheStore::new();
    for key in ALL_KEYS {
        store.set(key, b"{}", TTL).await.unwrap();
    }
    store
}

fn surviving(store: &MemoryCacheStore) -> Vec<&'static str> {
    ALL_KEYS
        .into_iter()
        .filter(|key| store.contains(key))
        .collect()
}

async fn deleted_by(signal: Signal) -> Vec<&'static str> {
    let store = seeded_store().await;
    let bus = SignalBus::with_default_handlers(Arc::new(store.clone()));
    bus.publish(&signal, &CancellationToken::new())
        .await
        .expect("publish failed");

    let left = surviving(&store);
    ALL_KEYS
        .into_iter()
        .filter(|key| !left.contains(key))
        .collect()
}

/// Store that records delete calls and can be switched off.
#[derive(Clone, Default)]
struct RecordingStore {
    inner: MemoryCacheStore,
    deletes: Arc<Mutex<Vec<String>>>,
    down: Arc<AtomicBool>,
}

impl RecordingStore {
    fn deleted(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CacheStore for RecordingStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], sliding_ttl: Duration) -> CacheResult<()> {
        self.inner.set(key, value, sliding_ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.delete_many(&[key]).await.map(|n| n == 1)
    }

    async fn delete_many(&self, keys: &[&str]) -> CacheResult<usize> {
        if self.down.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("store offline".into()));
        }
        self.deletes
            .lock()
            .unwrap()
            .extend(keys.iter().map(|k| k.to_string()));
        self.inner.delete_many(keys).await
    }
}

#[tokio::test]
async fn test_group_updated_deletes_exactly_detail_and_list_once() {
    let store = RecordingStore::default();
    let bus = SignalBus::with_default_handlers(Arc::new(store.clone()));

    let report = bus
        .publish(
            &Signal::GroupUpdated {
                group_id: "G1".into(),
                user_id: "U1".into(),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.kind, SignalKind::GroupUpdated);
    assert_eq!(report.handlers, 1);
    assert_eq!(store.deleted(), vec!["G1:GroupDetail", "U1:user_groups_list"]);
}

#[tokio::test]
async fn test_group_family_completeness() {
    for signal in [
        Signal::GroupCreated {
            group_id: "G1".into(),
            user_id: "U1".into(),
        },
        Signal::GroupDeleted {
            group_id: "G1".into(),
            user_id: "U1".into(),
        },
        Signal::GroupSubscriptionUnshared {
            group_id: "G1".into(),
            user_id: "U1".into(),
            subscription_id: "S1".into(),
        },
    ] {
        assert_eq!(
            deleted_by(signal).await,
            vec!["G1:GroupDetail", "U1:user_groups_list"]
        );
    }
}

#[tokio::test]
async fn test_membership_family_completeness() {
    for signal in [
        Signal::MemberJoined {
            group_id: "G1".into(),
            user_id: "U2".into(),
        },
        Signal::MemberLeft {
            group_id: "G1".into(),
            user_id: "U2".into(),
        },
        Signal::MemberRoleChanged {
            group_id: "G1".into(),
            user_id: "U2".into(),
            role: MemberRole::Admin,
        },
    ] {
        assert_eq!(
            deleted_by(signal).await,
            vec!["G1:GroupDetail", "U2:user_groups_list", "U2:upcoming_bills"]
        );
    }
}

#[tokio::test]
async fn test_subscription_family_completeness() {
    assert_eq!(
        deleted_by(Signal::SubscriptionCreated {
            subscription_id: "S1".into(),
            user_id: "U1".into(),
        })
        .await,
        vec!["U1:upcoming_bills"]
    );

    for signal in [
        Signal::SubscriptionUpdated {
            subscription_id: "S1".into(),
            user_id: "U1".into(),
        },
        Signal::SubscriptionDeleted {
            subscription_id: "S1".into(),
            user_id: "U1".into(),
        },
        Signal::SubscriptionCanceled {
            subscription_id: "S1".into(),
            user_id: "U1".into(),
        },
        Signal::SubscriptionRenewed {
            subscription_id: "S1".into(),
            user_id: "U1".into(),
        },
    ] {
        assert_eq!(
            deleted_by(signal).await,
            vec!["U1:upcoming_bills", "S1:SubscriptionDetail"]
        );
    }
}

#[tokio::test]
async fn test_user_family_completeness() {
    for signal in [
        Signal::UserCreated {
            external_id: "U1".into(),
        },
        Signal::UserUpdated {
            external_id: "U1".into(),
        },
        Signal::UserDeleted {
            external_id: "U1".into(),
        },
    ] {
        assert_eq!(deleted_by(signal).await, vec!["U1:UserDetail"]);
    }
}

#[tokio::test]
async fn test_republishing_is_idempotent() {
    let store = seeded_store().await;
    let bus = SignalBus::with_default_handlers(Arc::new(store.clone()));
    let signal = Signal::MemberLeft {
        group_id: "G1".into(),
        user_id: "U1".into(),
    };

    bus.publish(&signal, &CancellationToken::new()).await.unwrap();
    let after_first = surviving(&store);
    bus.publish(&signal, &CancellationToken::new()).await.unwrap();

    assert_eq!(surviving(&store), after_first);
    assert_eq!(bus.stats().signals_published, 2);
}

#[tokio::test]
async fn test_store_outage_reports_failed_handler() {
    let store = RecordingStore::default();
    store.down.store(true, Ordering::SeqCst);
    let bus = SignalBus::with_default_handlers(Arc::new(store));

    let err = bus
        .publish(
            &Signal::UserUpdated {
                external_id: "U1".into(),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].handler, "user");
    assert!(matches!(
        failures[0].error,
        InvalidationError::Cache(CacheError::Unavailable(_))
    ));
}

/// Handler that never finishes, to exercise cancellation mid-publish.
struct Stuck;

#[async_trait::async_trait]
impl SignalHandler for Stuck {
    fn name(&self) -> &'static str {
        "stuck"
    }

    fn subscribes_to(&self) -> &'static [SignalKind] {
        &[SignalKind::UserUpdated]
    }

    async fn handle(&self, _signal: &Signal) -> Result<(), InvalidationError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_cancel_while_handlers_run() {
    let store = seeded_store().await;
    let mut bus = SignalBus::with_default_handlers(Arc::new(store.clone()));
    bus.register(Arc::new(Stuck));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = bus
        .publish(
            &Signal::UserUpdated {
                external_id: "U1".into(),
            },
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PublishError::Cancelled {
            kind: SignalKind::UserUpdated
        }
    ));
    assert_eq!(bus.stats().publishes_cancelled, 1);
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_redis_store_invalidation() {
    let pool = RedisPool::connect(REDIS_URL, Duration::from_secs(2))
        .await
        .expect("Failed to connect to Redis");
    let store = RedisCacheStore::from_pool(&pool);

    let group = format!("it-{}", uuid::Uuid::new_v4());
    let detail = format!("{group}:GroupDetail");
    let list = format!("{group}-owner:user_groups_list");
    store.set(&detail, b"{}", TTL).await.unwrap();
    store.set(&list, b"[]", TTL).await.unwrap();

    let bus = SignalBus::with_default_handlers(Arc::new(store.clone()));
    bus.publish(
        &Signal::GroupDeleted {
            group_id: group.clone(),
            user_id: format!("{group}-owner"),
        },
        &CancellationToken::new(),
    )
    .await
    .expect("publish failed");

    assert!(store.get(&detail).await.unwrap().is_none());
    assert!(store.get(&list).await.unwrap().is_none());
}
