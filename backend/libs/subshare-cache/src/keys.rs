//! Shared cache key schema
//!
//! Every read path and every invalidation handler builds keys through this
//! module so the same logical value is always addressed identically.
//! Key format: `{id}:{qualifier}`, where the qualifier is the named view or,
//! for detail views, the aggregate's view type name.

use crate::{CacheError, CacheResult};
use std::fmt;

/// Prefix of the distributed lock guarding a key's recompute.
pub const LOCK_PREFIX: &str = "lock:";

/// Cached views, one qualifier each. Qualifiers are unique across views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheView {
    /// Group with members and shared subscriptions
    GroupDetail,
    /// Groups a user belongs to
    UserGroupsList,
    SubscriptionDetail,
    /// A user's upcoming bills across own and shared subscriptions
    UpcomingBills,
    /// User profile, addressed by external identity
    UserDetail,
}

impl CacheView {
    pub const ALL: [CacheView; 5] = [
        CacheView::GroupDetail,
        CacheView::UserGroupsList,
        CacheView::SubscriptionDetail,
        CacheView::UpcomingBills,
        CacheView::UserDetail,
    ];

    pub fn qualifier(self) -> &'static str {
        match self {
            CacheView::GroupDetail => "GroupDetail",
            CacheView::UserGroupsList => "user_groups_list",
            CacheView::SubscriptionDetail => "SubscriptionDetail",
            CacheView::UpcomingBills => "upcoming_bills",
            CacheView::UserDetail => "UserDetail",
        }
    }

    pub fn from_qualifier(qualifier: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.qualifier() == qualifier)
    }

    /// Key of this view for the given aggregate identifier.
    pub fn key(self, id: &str) -> CacheResult<CacheKey> {
        CacheKey::build(self.qualifier(), id, None)
    }
}

impl fmt::Display for CacheView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qualifier())
    }
}

/// A validated cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap a caller-built key. Only non-emptiness is enforced.
    pub fn new(raw: impl Into<String>) -> CacheResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(CacheError::InvalidKey("cache key must not be empty".into()));
        }
        Ok(Self(raw))
    }

    /// Build `{id}:{view}` when a named view is given, else `{id}:{type_name}`.
    ///
    /// # Example
    ///
    /// ```
    /// use subshare_cache::CacheKey;
    ///
    /// let key = CacheKey::build("GroupDetail", "G1", None).unwrap();
    /// assert_eq!(key.as_str(), "G1:GroupDetail");
    ///
    /// let key = CacheKey::build("User", "U1", Some("upcoming_bills")).unwrap();
    /// assert_eq!(key.as_str(), "U1:upcoming_bills");
    /// ```
    pub fn build(type_name: &str, id: &str, view: Option<&str>) -> CacheResult<Self> {
        if id.is_empty() || id.contains(':') {
            return Err(CacheError::InvalidKey(format!(
                "aggregate id must be non-empty and free of ':', got {:?}",
                id
            )));
        }
        let qualifier = view.unwrap_or(type_name);
        if qualifier.is_empty() || qualifier.contains(':') {
            return Err(CacheError::InvalidKey(format!(
                "qualifier must be non-empty and free of ':', got {:?}",
                qualifier
            )));
        }
        Ok(Self(format!("{}:{}", id, qualifier)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the distributed lock guarding this key.
    pub fn lock_name(&self) -> String {
        format!("{}{}", LOCK_PREFIX, self.0)
    }

    /// Trailing qualifier, used as the metrics label.
    pub fn qualifier(&self) -> &str {
        qualifier_of(&self.0)
    }

    pub fn view(&self) -> Option<CacheView> {
        CacheView::from_qualifier(self.qualifier())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Qualifier of a raw key string, `"unknown"` when the key has none.
pub(crate) fn qualifier_of(key: &str) -> &str {
    match key.rsplit_once(':') {
        Some((_, q)) if !q.is_empty() => q,
        _ => "unknown",
    }
}
