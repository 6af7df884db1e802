//! View shapes cached by the read paths.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: String,
    pub display_name: String,
    pub role: MemberRole,
    pub joined_on: NaiveDate,
}

/// Subscription as seen from a group it is shared with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedSubscription {
    pub subscription_id: String,
    pub name: String,
    pub owner_id: String,
    pub price_cents: i64,
    pub currency: String,
    pub billing_cycle: BillingCycle,
}

/// `{group_id}:GroupDetail`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDetail {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub members: Vec<GroupMember>,
    #[serde(default)]
    pub shared_subscriptions: Vec<SharedSubscription>,
}

/// Item of `{user_id}:user_groups_list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub role: MemberRole,
    pub member_count: u32,
}

/// `{subscription_id}:SubscriptionDetail`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDetail {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    pub started_on: NaiveDate,
    pub next_billing_date: Option<NaiveDate>,
    pub shared_with_groups: Vec<String>,
}

/// Item of `{user_id}:upcoming_bills`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingBill {
    pub subscription_id: String,
    pub name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub due_date: NaiveDate,
    pub billing_cycle: BillingCycle,
    /// Set when the bill comes from a subscription shared through a group
    pub via_group_id: Option<String>,
}

/// `{external_id}:UserDetail`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetail {
    pub id: String,
    pub external_id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}
