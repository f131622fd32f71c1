//! Subscription models.

use chrono::{DateTime, Utc};

use artisan_roast_core::{Cents, SubscriptionId, SubscriptionStatus, UserId};

use super::ShippingAddress;

/// A local subscription record mirroring the processor's billing state.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub processor_subscription_id: String,
    pub processor_customer_id: String,
    pub status: SubscriptionStatus,
    /// Product names on the subscription, parallel to `quantities`.
    pub product_names: Vec<String>,
    pub quantities: Vec<i32>,
    /// Recurring charge per billing period.
    pub price: Cents,
    /// Free-text billing schedule ("Every 2 weeks"). Feeds the billing
    /// period calculator; absent means the 14-day fallback applies.
    pub delivery_schedule: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    /// When collection resumes after a skipped billing period.
    pub paused_until: Option<DateTime<Utc>>,
    pub recipient_name: Option<String>,
    /// Contact phone for the recipient, synced from customer updates.
    pub recipient_phone: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub created_at: DateTime<Utc>,
}

/// Billing-state patch applied by subscription-updated webhooks.
///
/// Deliberately excludes product names, quantities, and price: update events
/// are not trusted to carry line detail, and the original record keeps what
/// checkout materialization established.
#[derive(Debug, Clone)]
pub struct SubscriptionPatch {
    pub processor_subscription_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub paused_until: Option<DateTime<Utc>>,
    /// Only applied when derivable from the event.
    pub delivery_schedule: Option<String>,
}

/// Upsert payload for a subscription, built from a normalized webhook event
/// or a re-fetched processor subscription. Carries everything mutable; the
/// stores key on `processor_subscription_id`.
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    pub processor_subscription_id: String,
    pub processor_customer_id: String,
    pub status: SubscriptionStatus,
    pub product_names: Vec<String>,
    pub quantities: Vec<i32>,
    pub price: Cents,
    pub delivery_schedule: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub paused_until: Option<DateTime<Utc>>,
    pub recipient_name: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}
