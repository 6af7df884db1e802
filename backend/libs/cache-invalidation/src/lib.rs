//! Signal-driven cache invalidation
//!
//! Mutating code publishes a [`Signal`] after its change commits. The
//! [`SignalBus`] hands the signal to every handler registered for its kind,
//! and each handler deletes the cache keys its aggregate family makes stale.
//! The next read repopulates through the cache coordinator.
//!
//! # Architecture
//!
//! ```text
//! GroupService::rename(G1) by U1
//!   1. Commit the change
//!   2. bus.publish(GroupUpdated { G1, U1 })
//!      ↓
//! SignalBus (kind → handlers, run concurrently, all awaited)
//!      ↓
//! GroupInvalidation handler
//!   3. stale_keys → [G1:GroupDetail, U1:user_groups_list]
//!   4. store.delete_many(keys)
//! ```
//!
//! Invalidation takes no lock. A population that read the database before
//! the commit can still write an old value after the delete; such a value
//! lives at most one sliding TTL.
//!
//! # Example
//!
//! ```no_run
//! use cache_invalidation::{Signal, SignalBus};
//! use std::sync::Arc;
//! use subshare_cache::store::MemoryCacheStore;
//! use subshare_cache::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = SignalBus::with_default_handlers(Arc::new(MemoryCacheStore::new()));
//!
//!     bus.publish(
//!         &Signal::MemberJoined {
//!             group_id: "G1".to_string(),
//!             user_id: "U2".to_string(),
//!         },
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

mod bus;
mod error;
pub mod handlers;
mod signal;
mod stats;

pub use bus::{PublishReport, SignalBus, SignalHandler};
pub use error::{HandlerFailure, InvalidationError, PublishError};
pub use handlers::{InvalidationHandler, InvalidationMapping};
pub use signal::{Signal, SignalKind};
pub use stats::{InvalidationStats, StatsCollector};
