//! Webhook event types.
//!
//! [`RawEvent`] is the envelope as delivered; [`NormalizedEvent`] is what the
//! dispatcher works with after [`normalizer::EventNormalizer`] has validated
//! identifiers and (for checkout completions) re-fetched authoritative data
//! from the processor.

pub mod normalizer;

pub use normalizer::EventNormalizer;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use artisan_roast_core::{Cents, DeliveryMethod, Email, PurchaseOptionId, UserId};

use crate::models::{PaymentRefs, ShippingAddress, SubscriptionPatch};
use crate::processor::ProcessorError;

/// A webhook delivery as received, before normalization.
#[derive(Debug, Deserialize)]
pub struct RawEvent {
    /// Processor event id (`evt_...`).
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: RawEventData,
}

#[derive(Debug, Deserialize)]
pub struct RawEventData {
    pub object: serde_json::Value,
}

/// Errors from event normalization.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The payload is missing identifying fields or carries uninterpretable
    /// data. Fatal for the event; never retried locally.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// Re-fetching authoritative data from the processor failed. Transient;
    /// surfaces as 5xx so the processor redelivers.
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

/// A webhook event after normalization.
#[derive(Debug)]
pub enum NormalizedEvent {
    CheckoutCompleted(CheckoutEvent),
    SubscriptionUpdated(SubscriptionEvent),
    SubscriptionCanceled {
        processor_subscription_id: String,
        canceled_at: Option<DateTime<Utc>>,
    },
    InvoicePaid(InvoiceEvent),
    CustomerUpdated(CustomerEvent),
    /// Recognized envelope, uninteresting kind. Acknowledged and dropped.
    Ignored { kind: String },
}

/// A completed checkout, built from the re-fetched session (never from the
/// webhook payload's own copy).
#[derive(Debug, Clone)]
pub struct CheckoutEvent {
    pub session_id: String,
    pub customer_id: Option<String>,
    pub customer_email: Option<Email>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    /// Explicit account id from checkout metadata, when the buyer was
    /// signed in.
    pub metadata_user_id: Option<UserId>,
    pub cart: Vec<CartLine>,
    pub delivery_method: DeliveryMethod,
    pub shipping_name: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub payment: PaymentRefs,
    pub total: Cents,
    /// Discount applied at checkout, from the re-fetched session's totals.
    pub discount: Cents,
    /// Present when the session created a subscription.
    pub subscription_id: Option<String>,
}

/// One cart line from checkout metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub purchase_option_id: PurchaseOptionId,
    pub quantity: i32,
}

/// A subscription-updated event, reduced to the billing-state patch the
/// store applies.
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    pub patch: SubscriptionPatch,
}

/// A paid invoice.
#[derive(Debug, Clone)]
pub struct InvoiceEvent {
    pub invoice_id: String,
    pub customer_id: Option<String>,
    /// Absent for one-off invoices; those are ignored downstream.
    pub subscription_id: Option<String>,
    /// "`subscription_cycle`" marks a renewal; anything else is the initial
    /// invoice (or a manual one).
    pub billing_reason: Option<String>,
    pub payment: PaymentRefs,
}

/// A customer-updated event, reduced to the contact fields that propagate
/// onto the customer's subscriptions and pending orders.
#[derive(Debug, Clone)]
pub struct CustomerEvent {
    pub customer_id: String,
    pub phone: Option<String>,
    /// Name on the customer's shipping profile.
    pub shipping_name: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

impl CustomerEvent {
    /// Whether the event carries anything worth propagating.
    #[must_use]
    pub const fn has_contact_changes(&self) -> bool {
        self.shipping_address.is_some() || self.phone.is_some()
    }
}

impl InvoiceEvent {
    /// Whether this invoice bills a renewal period (as opposed to the
    /// initial subscription invoice).
    #[must_use]
    pub fn is_renewal(&self) -> bool {
        self.billing_reason.as_deref() == Some("subscription_cycle")
    }
}
