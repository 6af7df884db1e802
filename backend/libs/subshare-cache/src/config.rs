//! Coordinator configuration, loaded from `CACHE_`-prefixed environment
//! variables. Every field has a default.

use crate::keys::CacheView;
use crate::lock::LockOptions;
use crate::{CacheError, CacheResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Redis URL shared by the store and the lock provider
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Upper bound on a single Redis command
    #[serde(default = "default_redis_command_timeout_ms")]
    pub redis_command_timeout_ms: u64,

    /// Bounded wait of one lock acquisition
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,

    /// Liveness TTL of a granted lock
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,

    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,

    /// Sleep between acquisition attempts while another holder recomputes
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Deadline for the whole miss path of one call
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Consecutive store/lock provider failures after which a call
    /// recomputes without the lock. 0 disables fail-open.
    #[serde(default = "default_fail_open_after")]
    pub fail_open_after: u32,

    // ============================================
    // Per-view sliding TTLs
    // ============================================
    #[serde(default = "default_ttl_group_detail_secs")]
    pub ttl_group_detail_secs: u64,

    #[serde(default = "default_ttl_user_groups_list_secs")]
    pub ttl_user_groups_list_secs: u64,

    #[serde(default = "default_ttl_subscription_detail_secs")]
    pub ttl_subscription_detail_secs: u64,

    #[serde(default = "default_ttl_upcoming_bills_secs")]
    pub ttl_upcoming_bills_secs: u64,

    #[serde(default = "default_ttl_user_detail_secs")]
    pub ttl_user_detail_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_command_timeout_ms() -> u64 {
    3_000
}

fn default_lock_wait_ms() -> u64 {
    5_000
}

fn default_lock_ttl_ms() -> u64 {
    10_000
}

fn default_lock_poll_interval_ms() -> u64 {
    50
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_max_wait_ms() -> u64 {
    30_000
}

fn default_fail_open_after() -> u32 {
    3
}

fn default_ttl_group_detail_secs() -> u64 {
    600 // 10 minutes
}

fn default_ttl_user_groups_list_secs() -> u64 {
    600
}

fn default_ttl_subscription_detail_secs() -> u64 {
    900
}

fn default_ttl_upcoming_bills_secs() -> u64 {
    300 // bills change with every renewal
}

fn default_ttl_user_detail_secs() -> u64 {
    1800
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            redis_command_timeout_ms: default_redis_command_timeout_ms(),
            lock_wait_ms: default_lock_wait_ms(),
            lock_ttl_ms: default_lock_ttl_ms(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_wait_ms: default_max_wait_ms(),
            fail_open_after: default_fail_open_after(),
            ttl_group_detail_secs: default_ttl_group_detail_secs(),
            ttl_user_groups_list_secs: default_ttl_user_groups_list_secs(),
            ttl_subscription_detail_secs: default_ttl_subscription_detail_secs(),
            ttl_upcoming_bills_secs: default_ttl_upcoming_bills_secs(),
            ttl_user_detail_secs: default_ttl_user_detail_secs(),
        }
    }
}

impl CacheConfig {
    pub const ENV_PREFIX: &'static str = "CACHE_";

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed(Self::ENV_PREFIX).from_env()
    }

    pub fn validate(&self) -> CacheResult<()> {
        let positive = [
            ("lock_wait_ms", self.lock_wait_ms),
            ("lock_ttl_ms", self.lock_ttl_ms),
            ("lock_poll_interval_ms", self.lock_poll_interval_ms),
            ("retry_backoff_ms", self.retry_backoff_ms),
            ("max_wait_ms", self.max_wait_ms),
            ("ttl_group_detail_secs", self.ttl_group_detail_secs),
            ("ttl_user_groups_list_secs", self.ttl_user_groups_list_secs),
            ("ttl_subscription_detail_secs", self.ttl_subscription_detail_secs),
            ("ttl_upcoming_bills_secs", self.ttl_upcoming_bills_secs),
            ("ttl_user_detail_secs", self.ttl_user_detail_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CacheError::Configuration(format!("{} must be positive", name)));
            }
        }
        if self.lock_ttl_ms <= self.lock_wait_ms {
            // Lock is not extended during recompute
            warn!(
                lock_ttl_ms = self.lock_ttl_ms,
                lock_wait_ms = self.lock_wait_ms,
                "Lock TTL does not exceed lock wait; slow recomputes may overlap"
            );
        }
        Ok(())
    }

    pub fn redis_command_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_command_timeout_ms)
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            ttl: Duration::from_millis(self.lock_ttl_ms),
            wait: Duration::from_millis(self.lock_wait_ms),
            poll_interval: Duration::from_millis(self.lock_poll_interval_ms),
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn fail_open_after(&self) -> Option<u32> {
        (self.fail_open_after > 0).then_some(self.fail_open_after)
    }

    /// Sliding TTL for a view.
    pub fn ttl_for(&self, view: CacheView) -> Duration {
        let secs = match view {
            CacheView::GroupDetail => self.ttl_group_detail_secs,
            CacheView::UserGroupsList => self.ttl_user_groups_list_secs,
            CacheView::SubscriptionDetail => self.ttl_subscription_detail_secs,
            CacheView::UpcomingBills => self.ttl_upcoming_bills_secs,
            CacheView::UserDetail => self.ttl_user_detail_secs,
        };
        Duration::from_secs(secs)
    }
}
