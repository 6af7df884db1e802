//! Per-family invalidation handlers
//!
//! Each family is a pure mapping from a signal to the keys it makes stale.
//! [`InvalidationHandler`] pairs a mapping with a store and deletes those
//! keys. Deleting an absent key is not an error, so running a handler twice
//! for the same signal leaves the store in the same state.

use crate::bus::SignalHandler;
use crate::{InvalidationError, Signal, SignalKind};
use std::marker::PhantomData;
use std::sync::Arc;
use subshare_cache::{CacheKey, CacheResult, CacheStore, CacheView};
use tracing::debug;

/// Static signal → stale-key table for one aggregate family.
pub trait InvalidationMapping: Send + Sync + 'static {
    /// Handler name used in logs and failure reports.
    const NAME: &'static str;

    /// Signals this family reacts to.
    const SIGNALS: &'static [SignalKind];

    /// Keys made stale by `signal`. Empty for signals outside the family.
    fn stale_keys(signal: &Signal) -> CacheResult<Vec<CacheKey>>;
}

/// Groups: created, updated, deleted, subscription shared or unshared.
pub struct GroupInvalidation;

impl InvalidationMapping for GroupInvalidation {
    const NAME: &'static str = "group";
    const SIGNALS: &'static [SignalKind] = &[
        SignalKind::GroupCreated,
        SignalKind::GroupUpdated,
        SignalKind::GroupDeleted,
        SignalKind::GroupSubscriptionShared,
        SignalKind::GroupSubscriptionUnshared,
    ];

    fn stale_keys(signal: &Signal) -> CacheResult<Vec<CacheKey>> {
        match signal {
            Signal::GroupCreated { group_id, user_id }
            | Signal::GroupUpdated { group_id, user_id }
            | Signal::GroupDeleted { group_id, user_id }
            | Signal::GroupSubscriptionShared {
                group_id, user_id, ..
            }
            | Signal::GroupSubscriptionUnshared {
                group_id, user_id, ..
            } => Ok(vec![
                CacheView::GroupDetail.key(group_id)?,
                CacheView::UserGroupsList.key(user_id)?,
            ]),
            _ => Ok(Vec::new()),
        }
    }
}

/// Memberships. A member's bills include subscriptions shared through the
/// group, so membership changes also drop the member's upcoming bills.
pub struct MembershipInvalidation;

impl InvalidationMapping for MembershipInvalidation {
    const NAME: &'static str = "membership";
    const SIGNALS: &'static [SignalKind] = &[
        SignalKind::MemberJoined,
        SignalKind::MemberLeft,
        SignalKind::MemberRoleChanged,
    ];

    fn stale_keys(signal: &Signal) -> CacheResult<Vec<CacheKey>> {
        match signal {
            Signal::MemberJoined { group_id, user_id }
            | Signal::MemberLeft { group_id, user_id }
            | Signal::MemberRoleChanged {
                group_id, user_id, ..
            } => Ok(vec![
                CacheView::GroupDetail.key(group_id)?,
                CacheView::UserGroupsList.key(user_id)?,
                CacheView::UpcomingBills.key(user_id)?,
            ]),
            _ => Ok(Vec::new()),
        }
    }
}

pub struct SubscriptionInvalidation;

impl InvalidationMapping for SubscriptionInvalidation {
    const NAME: &'static str = "subscription";
    const SIGNALS: &'static [SignalKind] = &[
        SignalKind::SubscriptionCreated,
        SignalKind::SubscriptionUpdated,
        SignalKind::SubscriptionDeleted,
        SignalKind::SubscriptionCanceled,
        SignalKind::SubscriptionRenewed,
    ];

    fn stale_keys(signal: &Signal) -> CacheResult<Vec<CacheKey>> {
        match signal {
            // Nothing could have cached the detail of a brand-new subscription
            Signal::SubscriptionCreated { user_id, .. } => {
                Ok(vec![CacheView::UpcomingBills.key(user_id)?])
            }
            Signal::SubscriptionUpdated {
                subscription_id,
                user_id,
            }
            | Signal::SubscriptionDeleted {
                subscription_id,
                user_id,
            }
            | Signal::SubscriptionCanceled {
                subscription_id,
                user_id,
            }
            | Signal::SubscriptionRenewed {
                subscription_id,
                user_id,
            } => Ok(vec![
                CacheView::SubscriptionDetail.key(subscription_id)?,
                CacheView::UpcomingBills.key(user_id)?,
            ]),
            _ => Ok(Vec::new()),
        }
    }
}

/// Users, keyed by external identity.
pub struct UserInvalidation;

impl InvalidationMapping for UserInvalidation {
    const NAME: &'static str = "user";
    const SIGNALS: &'static [SignalKind] = &[
        SignalKind::UserCreated,
        SignalKind::UserUpdated,
        SignalKind::UserDeleted,
    ];

    fn stale_keys(signal: &Signal) -> CacheResult<Vec<CacheKey>> {
        match signal {
            Signal::UserCreated { external_id }
            | Signal::UserUpdated { external_id }
            | Signal::UserDeleted { external_id } => {
                Ok(vec![CacheView::UserDetail.key(external_id)?])
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// Deletes the keys named by mapping `M` from a cache store.
pub struct InvalidationHandler<M> {
    store: Arc<dyn CacheStore>,
    _mapping: PhantomData<fn() -> M>,
}

impl<M: InvalidationMapping> InvalidationHandler<M> {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            _mapping: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<M: InvalidationMapping> SignalHandler for InvalidationHandler<M> {
    fn name(&self) -> &'static str {
        M::NAME
    }

    fn subscribes_to(&self) -> &'static [SignalKind] {
        M::SIGNALS
    }

    async fn handle(&self, signal: &Signal) -> Result<(), InvalidationError> {
        let keys = M::stale_keys(signal)?;
        if keys.is_empty() {
            return Ok(());
        }

        let names: Vec<&str> = keys.iter().map(CacheKey::as_str).collect();
        let deleted = self.store.delete_many(&names).await?;

        debug!(
            handler = M::NAME,
            signal = %signal.kind(),
            keys = ?names,
            deleted,
            "Invalidated cache keys"
        );
        Ok(())
    }
}
