//! Subshare cache coordination layer
//!
//! Cache-aside reads for the aggregate views served by the API, with:
//! - One recompute per key at a time across every instance (distributed lock
//!   plus double-checked population)
//! - Sliding expiration in the store
//! - A shared key schema so readers and invalidators agree on key names
//! - Configurable lock timings, backoff, deadline and fail-open policy
//! - Metrics integration
//!
//! # Example
//!
//! ```no_run
//! use subshare_cache::{CacheConfig, CacheCoordinator, CacheView, CancellationToken};
//! use subshare_cache::views::GroupDetail;
//!
//! # async fn load_group(id: &str) -> Result<GroupDetail, std::io::Error> { unimplemented!() }
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheConfig::from_env()?;
//! let cache = CacheCoordinator::connect(&config).await?;
//!
//! let key = CacheView::GroupDetail.key("G1")?;
//! let group: GroupDetail = cache
//!     .get_or_populate(
//!         &key,
//!         config.ttl_for(CacheView::GroupDetail),
//!         || load_group("G1"),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod error;
mod keys;
mod metrics;

pub mod codec;
pub mod lock;
pub mod store;
pub mod views;

pub use config::CacheConfig;
pub use coordinator::{or_cancel, CacheCoordinator, CoordinatorSettings};
pub use error::{CacheError, CacheResult, Cancelled, PopulateError};
pub use keys::{CacheKey, CacheView, LOCK_PREFIX};
pub use lock::{Acquisition, LockGuard, LockOptions, LockProvider, LockToken};
pub use metrics::CacheMetrics;
pub use store::CacheStore;

pub use tokio_util::sync::CancellationToken;
