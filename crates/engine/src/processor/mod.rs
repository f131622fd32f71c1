//! Payment processor port.
//!
//! All outbound processor calls go through the [`ProcessorClient`] trait so
//! the services can be exercised against [`mock::MockProcessor`]. The
//! production implementation is [`stripe::StripeClient`].
//!
//! The types here are processor-neutral projections of what the engine
//! actually consumes; raw API shapes stay inside the concrete client.

pub mod mock;
pub mod signature;
pub mod stripe;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use artisan_roast_core::Cents;

use crate::models::{PaymentRefs, ShippingAddress};

/// Errors from outbound processor calls.
///
/// `Timeout` is kept distinct from `Rejected` because the two mean different
/// things for refunds: a rejected refund definitively did not happen, while a
/// timed-out one has an unknown outcome and needs manual reconciliation.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The request did not complete within the configured timeout.
    #[error("processor request timed out during {operation}")]
    Timeout { operation: &'static str },

    /// The processor returned a non-success status.
    #[error("processor rejected the request ({status:?}): {message}")]
    Rejected {
        status: Option<u16>,
        message: String,
    },

    /// The request could not be sent or the connection failed.
    #[error("processor transport error: {0}")]
    Transport(String),

    /// The response body could not be interpreted.
    #[error("unexpected processor response: {0}")]
    Malformed(String),
}

/// How a checkout session bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    /// One-time payment only.
    Payment,
    /// At least one recurring line; the session carries a subscription id.
    Subscription,
}

/// A checkout session re-fetched from the processor.
///
/// Money-relevant fields on webhook payloads are never trusted; the
/// normalizer re-fetches the session by id and reads amounts from this copy.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    /// Payment status as reported ("paid" when capture completed).
    pub payment_status: String,
    pub mode: CheckoutMode,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub amount_total: Cents,
    /// Total discount applied across the session (zero when no promotion
    /// was used).
    pub discount: Cents,
    pub subscription_id: Option<String>,
    pub payment: PaymentRefs,
    pub shipping_name: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    /// Checkout metadata set by the storefront (cart lines, delivery method,
    /// optional user id).
    pub metadata: HashMap<String, String>,
}

/// A subscription as the processor sees it.
#[derive(Debug, Clone)]
pub struct ProcessorSubscription {
    pub id: String,
    pub customer_id: String,
    /// Raw processor status ("active", "past_due", "canceled", ...).
    pub status: String,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    /// When collection is paused, the timestamp it resumes at.
    pub pause_resumes_at: Option<DateTime<Utc>>,
    pub lines: Vec<SubscriptionLine>,
    /// Payment references from the latest invoice, when expanded.
    pub latest_payment: PaymentRefs,
    pub metadata: HashMap<String, String>,
}

/// One recurring line on a processor subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionLine {
    pub product_name: String,
    pub quantity: i32,
    pub unit_amount: Cents,
    /// Billing interval unit ("week", "month").
    pub interval: Option<String>,
    pub interval_count: Option<i32>,
    /// Price nickname, e.g. "Every 2 weeks - 12oz".
    pub price_nickname: Option<String>,
}

/// A charge listed for a customer.
#[derive(Debug, Clone)]
pub struct Charge {
    pub id: String,
    pub amount: Cents,
    pub refunded: bool,
    pub status: String,
}

impl Charge {
    /// Whether this charge is a valid refund target for the given amount:
    /// exact amount match, not already refunded, and succeeded.
    #[must_use]
    pub fn matches_refund(&self, amount: Cents) -> bool {
        self.amount == amount && !self.refunded && self.status == "succeeded"
    }
}

/// A created refund.
#[derive(Debug, Clone)]
pub struct Refund {
    pub id: String,
    pub status: String,
}

/// Outbound processor operations the engine depends on.
#[async_trait]
pub trait ProcessorClient: Send + Sync {
    /// Re-fetch a checkout session by id.
    async fn fetch_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProcessorError>;

    /// Fetch a subscription by id.
    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProcessorSubscription, ProcessorError>;

    /// Fetch a customer's email address.
    async fn fetch_customer_email(
        &self,
        customer_id: &str,
    ) -> Result<Option<String>, ProcessorError>;

    /// Refund a payment by its transaction (payment intent) id.
    async fn refund_transaction(&self, transaction_id: &str) -> Result<Refund, ProcessorError>;

    /// Refund a specific charge.
    async fn refund_charge(&self, charge_id: &str) -> Result<Refund, ProcessorError>;

    /// List recent charges for a customer, newest first.
    async fn list_charges(
        &self,
        customer_id: &str,
        limit: u8,
    ) -> Result<Vec<Charge>, ProcessorError>;

    /// Cancel a subscription immediately.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), ProcessorError>;

    /// Pause collection until the given timestamp (skip one billing period).
    async fn pause_collection(
        &self,
        subscription_id: &str,
        resumes_at: DateTime<Utc>,
    ) -> Result<(), ProcessorError>;

    /// Clear a collection pause.
    async fn resume_collection(&self, subscription_id: &str) -> Result<(), ProcessorError>;

    /// Merge key/value pairs into the subscription's metadata (shipping
    /// snapshot for renewal orders).
    async fn update_subscription_metadata(
        &self,
        subscription_id: &str,
        entries: &[(&str, String)],
    ) -> Result<(), ProcessorError>;
}
