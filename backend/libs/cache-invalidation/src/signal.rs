//! Domain signals raised after a committed mutation

use serde::{Deserialize, Serialize};
use std::fmt;
use subshare_cache::views::MemberRole;

/// Signal payloads carry only the identifiers needed to name stale keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Signal {
    // Group family
    GroupCreated { group_id: String, user_id: String },
    GroupUpdated { group_id: String, user_id: String },
    GroupDeleted { group_id: String, user_id: String },
    GroupSubscriptionShared {
        group_id: String,
        user_id: String,
        subscription_id: String,
    },
    GroupSubscriptionUnshared {
        group_id: String,
        user_id: String,
        subscription_id: String,
    },

    // Membership family
    MemberJoined { group_id: String, user_id: String },
    MemberLeft { group_id: String, user_id: String },
    MemberRoleChanged {
        group_id: String,
        user_id: String,
        role: MemberRole,
    },

    // Subscription family
    SubscriptionCreated { subscription_id: String, user_id: String },
    SubscriptionUpdated { subscription_id: String, user_id: String },
    SubscriptionDeleted { subscription_id: String, user_id: String },
    SubscriptionCanceled { subscription_id: String, user_id: String },
    SubscriptionRenewed { subscription_id: String, user_id: String },

    // User family
    UserCreated { external_id: String },
    UserUpdated { external_id: String },
    UserDeleted { external_id: String },
}

/// Fieldless discriminant of [`Signal`], used as the bus routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    GroupCreated,
    GroupUpdated,
    GroupDeleted,
    GroupSubscriptionShared,
    GroupSubscriptionUnshared,
    MemberJoined,
    MemberLeft,
    MemberRoleChanged,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    SubscriptionCanceled,
    SubscriptionRenewed,
    UserCreated,
    UserUpdated,
    UserDeleted,
}

impl SignalKind {
    pub const ALL: [SignalKind; 16] = [
        SignalKind::GroupCreated,
        SignalKind::GroupUpdated,
        SignalKind::GroupDeleted,
        SignalKind::GroupSubscriptionShared,
        SignalKind::GroupSubscriptionUnshared,
        SignalKind::MemberJoined,
        SignalKind::MemberLeft,
        SignalKind::MemberRoleChanged,
        SignalKind::SubscriptionCreated,
        SignalKind::SubscriptionUpdated,
        SignalKind::SubscriptionDeleted,
        SignalKind::SubscriptionCanceled,
        SignalKind::SubscriptionRenewed,
        SignalKind::UserCreated,
        SignalKind::UserUpdated,
        SignalKind::UserDeleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::GroupCreated => "GroupCreated",
            SignalKind::GroupUpdated => "GroupUpdated",
            SignalKind::GroupDeleted => "GroupDeleted",
            SignalKind::GroupSubscriptionShared => "GroupSubscriptionShared",
            SignalKind::GroupSubscriptionUnshared => "GroupSubscriptionUnshared",
            SignalKind::MemberJoined => "MemberJoined",
            SignalKind::MemberLeft => "MemberLeft",
            SignalKind::MemberRoleChanged => "MemberRoleChanged",
            SignalKind::SubscriptionCreated => "SubscriptionCreated",
            SignalKind::SubscriptionUpdated => "SubscriptionUpdated",
            SignalKind::SubscriptionDeleted => "SubscriptionDeleted",
            SignalKind::SubscriptionCanceled => "SubscriptionCanceled",
            SignalKind::SubscriptionRenewed => "SubscriptionRenewed",
            SignalKind::UserCreated => "UserCreated",
            SignalKind::UserUpdated => "UserUpdated",
            SignalKind::UserDeleted => "UserDeleted",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::GroupCreated { .. } => SignalKind::GroupCreated,
            Signal::GroupUpdated { .. } => SignalKind::GroupUpdated,
            Signal::GroupDeleted { .. } => SignalKind::GroupDeleted,
            Signal::GroupSubscriptionShared { .. } => SignalKind::GroupSubscriptionShared,
            Signal::GroupSubscriptionUnshared { .. } => SignalKind::GroupSubscriptionUnshared,
            Signal::MemberJoined { .. } => SignalKind::MemberJoined,
            Signal::MemberLeft { .. } => SignalKind::MemberLeft,
            Signal::MemberRoleChanged { .. } => SignalKind::MemberRoleChanged,
            Signal::SubscriptionCreated { .. } => SignalKind::SubscriptionCreated,
            Signal::SubscriptionUpdated { .. } => SignalKind::SubscriptionUpdated,
            Signal::SubscriptionDeleted { .. } => SignalKind::SubscriptionDeleted,
            Signal::SubscriptionCanceled { .. } => SignalKind::SubscriptionCanceled,
            Signal::SubscriptionRenewed { .. } => SignalKind::SubscriptionRenewed,
            Signal::UserCreated { .. } => SignalKind::UserCreated,
            Signal::UserUpdated { .. } => SignalKind::UserUpdated,
            Signal::UserDeleted { .. } => SignalKind::UserDeleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant_name() {
        let signal = Signal::MemberRoleChanged {
            group_id: "G1".into(),
            user_id: "U1".into(),
            role: MemberRole::Admin,
        };
        assert_eq!(signal.kind(), SignalKind::MemberRoleChanged);
        assert_eq!(signal.kind().to_string(), "MemberRoleChanged");
    }

    #[test]
    fn test_kind_names_are_unique() {
        let mut names: Vec<_> = SignalKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SignalKind::ALL.len());
    }

    #[test]
    fn test_signal_serialization_is_tagged() {
        let signal = Signal::GroupUpdated {
            group_id: "G1".into(),
            user_id: "U1".into(),
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], "GroupUpdated");
        assert_eq!(json["group_id"], "G1");

        let back: Signal = serde_json::from_value(json).unwrap();
        assert_eq!(back, signal);
    }
}
