//! Turns raw webhook payloads into [`NormalizedEvent`]s.
//!
//! Checkout completions are the only kind that re-fetches from the
//! processor: the webhook's embedded session copy is untrusted for money
//! fields. Subscription and invoice events are normalized straight from the
//! payload (the dispatcher re-fetches subscriptions where it needs line
//! detail).

use std::sync::Arc;

use serde::Deserialize;

use artisan_roast_core::{DeliveryMethod, Email, PurchaseOptionId, SubscriptionStatus, UserId};

use crate::models::{PaymentRefs, ShippingAddress, SubscriptionPatch, SubscriptionRecord};
use crate::processor::{CheckoutSession, ProcessorClient, ProcessorSubscription};

use super::{
    CartLine, CheckoutEvent, CustomerEvent, InvoiceEvent, NormalizeError, NormalizedEvent,
    RawEvent, SubscriptionEvent,
};

/// Cart line as serialized into checkout metadata by the storefront
/// (shortened keys to stay under the processor's metadata size limit).
#[derive(Debug, Deserialize)]
struct CartLineMeta {
    po: i64,
    qty: i32,
}

/// Normalizes raw webhook deliveries.
pub struct EventNormalizer {
    processor: Arc<dyn ProcessorClient>,
}

impl EventNormalizer {
    #[must_use]
    pub fn new(processor: Arc<dyn ProcessorClient>) -> Self {
        Self { processor }
    }

    /// Normalize a raw event.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::Malformed`] when identifying fields are
    /// missing, and [`NormalizeError::Processor`] when a required re-fetch
    /// fails.
    pub async fn normalize(&self, raw: &RawEvent) -> Result<NormalizedEvent, NormalizeError> {
        match raw.kind.as_str() {
            "checkout.session.completed" => self.normalize_checkout(raw).await,
            "customer.subscription.updated" => normalize_subscription_updated(raw),
            "customer.subscription.deleted" => normalize_subscription_deleted(raw),
            "customer.updated" => normalize_customer_updated(raw),
            "invoice.paid" | "invoice.payment_succeeded" => normalize_invoice(raw),
            _ => Ok(NormalizedEvent::Ignored {
                kind: raw.kind.clone(),
            }),
        }
    }

    async fn normalize_checkout(&self, raw: &RawEvent) -> Result<NormalizedEvent, NormalizeError> {
        let session_id = str_field(&raw.data.object, "id")
            .ok_or_else(|| NormalizeError::Malformed("checkout event has no session id".into()))?;

        // Authoritative copy; money fields only come from here.
        let session = self.processor.fetch_checkout_session(session_id).await?;

        if session.payment_status != "paid" {
            tracing::info!(session_id, payment_status = %session.payment_status,
                "Checkout session not paid, ignoring");
            return Ok(NormalizedEvent::Ignored {
                kind: format!("{} (unpaid)", raw.kind),
            });
        }

        Ok(NormalizedEvent::CheckoutCompleted(checkout_event(&session)?))
    }
}

fn checkout_event(session: &CheckoutSession) -> Result<CheckoutEvent, NormalizeError> {
    let cart_json = session.metadata.get("cartItems").ok_or_else(|| {
        NormalizeError::Malformed(format!(
            "checkout session {} has no cartItems metadata",
            session.id
        ))
    })?;
    let cart: Vec<CartLineMeta> = serde_json::from_str(cart_json).map_err(|e| {
        NormalizeError::Malformed(format!("unparseable cartItems on {}: {e}", session.id))
    })?;
    if cart.is_empty() {
        return Err(NormalizeError::Malformed(format!(
            "checkout session {} has an empty cart",
            session.id
        )));
    }

    let delivery_method = session
        .metadata
        .get("deliveryMethod")
        .and_then(|m| m.parse::<DeliveryMethod>().ok())
        .unwrap_or_default();

    let metadata_user_id = session.metadata.get("userId").and_then(|raw| {
        raw.parse::<i64>().map(UserId::new).ok().or_else(|| {
            tracing::warn!(session_id = %session.id, user_id = %raw,
                "Non-numeric userId in checkout metadata");
            None
        })
    });

    let customer_email = session.customer_email.as_deref().and_then(|raw| {
        Email::parse(raw).ok().or_else(|| {
            tracing::warn!(session_id = %session.id, "Unparseable customer email on session");
            None
        })
    });

    Ok(CheckoutEvent {
        session_id: session.id.clone(),
        customer_id: session.customer_id.clone(),
        customer_email,
        customer_name: session.customer_name.clone(),
        customer_phone: session.customer_phone.clone(),
        metadata_user_id,
        cart: cart
            .iter()
            .map(|line| CartLine {
                purchase_option_id: PurchaseOptionId::new(line.po),
                quantity: line.qty,
            })
            .collect(),
        delivery_method,
        shipping_name: session.shipping_name.clone(),
        shipping_address: session.shipping_address.clone(),
        payment: session.payment.clone(),
        total: session.amount_total,
        discount: session.discount,
        subscription_id: session.subscription_id.clone(),
    })
}

fn normalize_subscription_updated(raw: &RawEvent) -> Result<NormalizedEvent, NormalizeError> {
    let object = &raw.data.object;
    let id = str_field(object, "id")
        .ok_or_else(|| NormalizeError::Malformed("subscription event has no id".into()))?;
    let status = str_field(object, "status")
        .ok_or_else(|| NormalizeError::Malformed(format!("subscription {id} has no status")))?;
    let period_start = timestamp_field(object, "current_period_start")
        .ok_or_else(|| NormalizeError::Malformed(format!("subscription {id} has no period start")))?;
    let period_end = timestamp_field(object, "current_period_end")
        .ok_or_else(|| NormalizeError::Malformed(format!("subscription {id} has no period end")))?;

    let paused_until = object
        .pointer("/pause_collection/resumes_at")
        .and_then(serde_json::Value::as_i64)
        .and_then(|t| chrono::DateTime::from_timestamp(t, 0));

    let nickname = object
        .pointer("/items/data/0/price/nickname")
        .and_then(serde_json::Value::as_str);
    let interval = object
        .pointer("/items/data/0/price/recurring/interval")
        .and_then(serde_json::Value::as_str);
    #[allow(clippy::cast_possible_truncation)]
    let interval_count = object
        .pointer("/items/data/0/price/recurring/interval_count")
        .and_then(serde_json::Value::as_i64)
        .map(|c| c as i32);
    let metadata_schedule = object
        .pointer("/metadata/deliverySchedule")
        .and_then(serde_json::Value::as_str);

    let patch = SubscriptionPatch {
        processor_subscription_id: id.to_owned(),
        status: map_status(status, paused_until.is_some()),
        current_period_start: period_start,
        current_period_end: period_end,
        cancel_at_period_end: bool_field(object, "cancel_at_period_end")
            || object.get("cancel_at").is_some_and(|v| !v.is_null()),
        canceled_at: timestamp_field(object, "canceled_at"),
        paused_until,
        delivery_schedule: derive_schedule(metadata_schedule, nickname, interval, interval_count),
    };

    Ok(NormalizedEvent::SubscriptionUpdated(SubscriptionEvent {
        patch,
    }))
}

fn normalize_subscription_deleted(raw: &RawEvent) -> Result<NormalizedEvent, NormalizeError> {
    let object = &raw.data.object;
    let id = str_field(object, "id")
        .ok_or_else(|| NormalizeError::Malformed("subscription event has no id".into()))?;
    Ok(NormalizedEvent::SubscriptionCanceled {
        processor_subscription_id: id.to_owned(),
        canceled_at: timestamp_field(object, "canceled_at"),
    })
}

fn normalize_customer_updated(raw: &RawEvent) -> Result<NormalizedEvent, NormalizeError> {
    let object = &raw.data.object;
    let id = str_field(object, "id")
        .ok_or_else(|| NormalizeError::Malformed("customer event has no id".into()))?;

    Ok(NormalizedEvent::CustomerUpdated(CustomerEvent {
        customer_id: id.to_owned(),
        phone: str_field(object, "phone").map(str::to_owned),
        shipping_name: object
            .pointer("/shipping/name")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned),
        shipping_address: customer_shipping(object),
    }))
}

/// Parse the shipping address off a customer object; `line2` folds into the
/// street line the same way checkout session addresses do.
fn customer_shipping(object: &serde_json::Value) -> Option<ShippingAddress> {
    let address = object.pointer("/shipping/address")?;
    let field = |key: &str| {
        address
            .get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };

    let mut street = address.get("line1").and_then(serde_json::Value::as_str)?.to_owned();
    if let Some(line2) = address
        .get("line2")
        .and_then(serde_json::Value::as_str)
        .filter(|l| !l.is_empty())
    {
        street.push_str(", ");
        street.push_str(line2);
    }

    Some(ShippingAddress {
        street,
        city: field("city"),
        state: field("state"),
        postal_code: field("postal_code"),
        country: field("country"),
    })
}

fn normalize_invoice(raw: &RawEvent) -> Result<NormalizedEvent, NormalizeError> {
    let object = &raw.data.object;
    let invoice_id = str_field(object, "id")
        .ok_or_else(|| NormalizeError::Malformed("invoice event has no id".into()))?;

    // Newer API versions moved the subscription reference under parent.
    let subscription_id = str_field(object, "subscription").or_else(|| {
        object
            .pointer("/parent/subscription_details/subscription")
            .and_then(serde_json::Value::as_str)
    });

    let payment = PaymentRefs {
        transaction_id: str_field(object, "payment_intent").map(str::to_owned),
        charge_id: str_field(object, "charge").map(str::to_owned),
        invoice_id: Some(invoice_id.to_owned()),
        card_summary: None,
    };

    Ok(NormalizedEvent::InvoicePaid(InvoiceEvent {
        invoice_id: invoice_id.to_owned(),
        customer_id: str_field(object, "customer").map(str::to_owned),
        subscription_id: subscription_id.map(str::to_owned),
        billing_reason: str_field(object, "billing_reason").map(str::to_owned),
        payment,
    }))
}

/// Map a raw processor status (plus pause state) to the local enum.
#[must_use]
pub fn map_status(raw: &str, paused: bool) -> SubscriptionStatus {
    if paused {
        return SubscriptionStatus::Paused;
    }
    match raw {
        "canceled" => SubscriptionStatus::Canceled,
        "past_due" | "unpaid" => SubscriptionStatus::PastDue,
        _ => SubscriptionStatus::Active,
    }
}

/// Derive the human-readable delivery schedule for a subscription.
///
/// Priority: explicit metadata, then a price nickname containing "Every ...",
/// then the recurring interval itself.
#[must_use]
pub fn derive_schedule(
    metadata_schedule: Option<&str>,
    nickname: Option<&str>,
    interval: Option<&str>,
    interval_count: Option<i32>,
) -> Option<String> {
    if let Some(schedule) = metadata_schedule.filter(|s| !s.trim().is_empty()) {
        return Some(schedule.trim().to_owned());
    }

    if let Some(nickname) = nickname {
        // Scan on char boundaries of the original string; lowercasing can
        // change byte lengths and invalidate offsets.
        let needle = "every";
        let start = nickname.char_indices().map(|(i, _)| i).find(|&i| {
            nickname
                .get(i..i + needle.len())
                .is_some_and(|s| s.eq_ignore_ascii_case(needle))
        });
        if let Some(tail) = start.and_then(|i| nickname.get(i..)) {
            let end = tail.find(['-', '(']).unwrap_or(tail.len());
            let schedule = tail.get(..end).unwrap_or(tail).trim();
            if !schedule.is_empty() {
                return Some(schedule.to_owned());
            }
        }
    }

    interval.map(|interval| match interval_count.unwrap_or(1) {
        1 => format!("Every {interval}"),
        n => format!("Every {n} {interval}s"),
    })
}

/// Build an upsert record from a re-fetched processor subscription.
///
/// Shipping comes from subscription metadata when the checkout flow stamped
/// it there (`shippingAddress` as JSON, `recipientName`).
#[must_use]
pub fn record_from_processor(sub: &ProcessorSubscription) -> SubscriptionRecord {
    let price = sub
        .lines
        .iter()
        .map(|line| line.unit_amount.times(i64::from(line.quantity)))
        .sum();

    let first = sub.lines.first();
    let delivery_schedule = derive_schedule(
        sub.metadata.get("deliverySchedule").map(String::as_str),
        first.and_then(|l| l.price_nickname.as_deref()),
        first.and_then(|l| l.interval.as_deref()),
        first.and_then(|l| l.interval_count),
    );

    let shipping_address = sub
        .metadata
        .get("shippingAddress")
        .and_then(|json| serde_json::from_str::<ShippingAddress>(json).ok());

    SubscriptionRecord {
        processor_subscription_id: sub.id.clone(),
        processor_customer_id: sub.customer_id.clone(),
        status: map_status(&sub.status, sub.pause_resumes_at.is_some()),
        product_names: sub.lines.iter().map(|l| l.product_name.clone()).collect(),
        quantities: sub.lines.iter().map(|l| l.quantity).collect(),
        price,
        delivery_schedule,
        current_period_start: sub.current_period_start,
        current_period_end: sub.current_period_end,
        cancel_at_period_end: sub.cancel_at_period_end,
        canceled_at: sub.canceled_at,
        paused_until: sub.pause_resumes_at,
        recipient_name: sub.metadata.get("recipientName").cloned(),
        shipping_address,
    }
}

fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(serde_json::Value::as_str)
}

fn bool_field(value: &serde_json::Value, key: &str) -> bool {
    value
        .get(key)
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

fn timestamp_field(value: &serde_json::Value, key: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    value
        .get(key)
        .and_then(serde_json::Value::as_i64)
        .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use artisan_roast_core::Cents;

    use crate::processor::mock::MockProcessor;
    use crate::processor::CheckoutMode;

    use super::*;

    fn raw(kind: &str, object: serde_json::Value) -> RawEvent {
        serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": kind,
            "data": { "object": object }
        }))
        .unwrap()
    }

    fn paid_session(metadata: HashMap<String, String>) -> CheckoutSession {
        CheckoutSession {
            id: "cs_1".to_owned(),
            payment_status: "paid".to_owned(),
            mode: CheckoutMode::Payment,
            customer_id: Some("cus_9".to_owned()),
            customer_email: Some("jane@example.com".to_owned()),
            customer_name: Some("Jane Doe".to_owned()),
            customer_phone: None,
            amount_total: Cents::new(3500),
            discount: Cents::ZERO,
            subscription_id: None,
            payment: PaymentRefs::default(),
            shipping_name: None,
            shipping_address: None,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_checkout_refetches_and_parses_cart() {
        let mock = Arc::new(MockProcessor::new());
        let mut metadata = HashMap::new();
        metadata.insert(
            "cartItems".to_owned(),
            r#"[{"po":1,"qty":2},{"po":3,"qty":1}]"#.to_owned(),
        );
        metadata.insert("deliveryMethod".to_owned(), "PICKUP".to_owned());
        metadata.insert("userId".to_owned(), "42".to_owned());
        mock.add_session(paid_session(metadata));

        let normalizer = EventNormalizer::new(mock.clone());
        let event = normalizer
            .normalize(&raw(
                "checkout.session.completed",
                serde_json::json!({"id": "cs_1", "amount_total": 99}),
            ))
            .await
            .unwrap();

        let NormalizedEvent::CheckoutCompleted(checkout) = event else {
            panic!("expected checkout event");
        };
        assert_eq!(checkout.cart.len(), 2);
        assert_eq!(checkout.cart[0].quantity, 2);
        assert_eq!(checkout.delivery_method, DeliveryMethod::Pickup);
        assert_eq!(checkout.metadata_user_id, Some(UserId::new(42)));
        // Total comes from the re-fetched session, not the payload.
        assert_eq!(checkout.total, Cents::new(3500));
        assert_eq!(mock.calls(), vec!["fetch_checkout_session cs_1"]);
    }

    #[tokio::test]
    async fn test_checkout_without_session_id_is_malformed() {
        let normalizer = EventNormalizer::new(Arc::new(MockProcessor::new()));
        let result = normalizer
            .normalize(&raw("checkout.session.completed", serde_json::json!({})))
            .await;
        assert!(matches!(result, Err(NormalizeError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_checkout_without_cart_metadata_is_malformed() {
        let mock = Arc::new(MockProcessor::new());
        mock.add_session(paid_session(HashMap::new()));
        let normalizer = EventNormalizer::new(mock);
        let result = normalizer
            .normalize(&raw(
                "checkout.session.completed",
                serde_json::json!({"id": "cs_1"}),
            ))
            .await;
        assert!(matches!(result, Err(NormalizeError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_unpaid_checkout_ignored() {
        let mock = Arc::new(MockProcessor::new());
        let mut session = paid_session(HashMap::new());
        session.payment_status = "unpaid".to_owned();
        mock.add_session(session);
        let normalizer = EventNormalizer::new(mock);
        let event = normalizer
            .normalize(&raw(
                "checkout.session.completed",
                serde_json::json!({"id": "cs_1"}),
            ))
            .await
            .unwrap();
        assert!(matches!(event, NormalizedEvent::Ignored { .. }));
    }

    #[tokio::test]
    async fn test_subscription_updated_builds_patch() {
        let normalizer = EventNormalizer::new(Arc::new(MockProcessor::new()));
        let event = normalizer
            .normalize(&raw(
                "customer.subscription.updated",
                serde_json::json!({
                    "id": "sub_1",
                    "status": "active",
                    "current_period_start": 1_700_000_000,
                    "current_period_end": 1_701_209_600,
                    "cancel_at_period_end": true,
                    "pause_collection": null,
                    "items": { "data": [{ "price": {
                        "nickname": "Every 2 weeks - 12oz",
                        "recurring": { "interval": "week", "interval_count": 2 }
                    }}]}
                }),
            ))
            .await
            .unwrap();

        let NormalizedEvent::SubscriptionUpdated(sub) = event else {
            panic!("expected subscription event");
        };
        assert_eq!(sub.patch.processor_subscription_id, "sub_1");
        assert_eq!(sub.patch.status, SubscriptionStatus::Active);
        assert!(sub.patch.cancel_at_period_end);
        assert_eq!(sub.patch.delivery_schedule.as_deref(), Some("Every 2 weeks"));
    }

    #[tokio::test]
    async fn test_subscription_updated_with_pause_maps_to_paused() {
        let normalizer = EventNormalizer::new(Arc::new(MockProcessor::new()));
        let event = normalizer
            .normalize(&raw(
                "customer.subscription.updated",
                serde_json::json!({
                    "id": "sub_1",
                    "status": "active",
                    "current_period_start": 1_700_000_000,
                    "current_period_end": 1_701_209_600,
                    "pause_collection": { "resumes_at": 1_702_419_200 }
                }),
            ))
            .await
            .unwrap();

        let NormalizedEvent::SubscriptionUpdated(sub) = event else {
            panic!("expected subscription event");
        };
        assert_eq!(sub.patch.status, SubscriptionStatus::Paused);
        assert!(sub.patch.paused_until.is_some());
    }

    #[tokio::test]
    async fn test_invoice_paid_normalizes_refs() {
        let normalizer = EventNormalizer::new(Arc::new(MockProcessor::new()));
        let event = normalizer
            .normalize(&raw(
                "invoice.payment_succeeded",
                serde_json::json!({
                    "id": "in_1",
                    "customer": "cus_9",
                    "subscription": "sub_1",
                    "billing_reason": "subscription_cycle",
                    "payment_intent": "pi_1",
                    "charge": "ch_1"
                }),
            ))
            .await
            .unwrap();

        let NormalizedEvent::InvoicePaid(invoice) = event else {
            panic!("expected invoice event");
        };
        assert!(invoice.is_renewal());
        assert_eq!(invoice.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(invoice.payment.transaction_id.as_deref(), Some("pi_1"));
        assert_eq!(invoice.payment.invoice_id.as_deref(), Some("in_1"));
    }

    #[tokio::test]
    async fn test_checkout_carries_session_discount() {
        let mock = Arc::new(MockProcessor::new());
        let mut metadata = HashMap::new();
        metadata.insert("cartItems".to_owned(), r#"[{"po":1,"qty":1}]"#.to_owned());
        let mut session = paid_session(metadata);
        session.discount = Cents::new(600);
        mock.add_session(session);

        let normalizer = EventNormalizer::new(mock);
        let event = normalizer
            .normalize(&raw(
                "checkout.session.completed",
                serde_json::json!({"id": "cs_1"}),
            ))
            .await
            .unwrap();

        let NormalizedEvent::CheckoutCompleted(checkout) = event else {
            panic!("expected checkout event");
        };
        assert_eq!(checkout.discount, Cents::new(600));
    }

    #[tokio::test]
    async fn test_customer_updated_extracts_contact_fields() {
        let normalizer = EventNormalizer::new(Arc::new(MockProcessor::new()));
        let event = normalizer
            .normalize(&raw(
                "customer.updated",
                serde_json::json!({
                    "id": "cus_9",
                    "phone": "+15035551234",
                    "shipping": {
                        "name": "Jane Doe",
                        "address": {
                            "line1": "500 SE Division St",
                            "line2": "Apt 2",
                            "city": "Portland",
                            "state": "OR",
                            "postal_code": "97202",
                            "country": "US"
                        }
                    }
                }),
            ))
            .await
            .unwrap();

        let NormalizedEvent::CustomerUpdated(customer) = event else {
            panic!("expected customer event");
        };
        assert!(customer.has_contact_changes());
        assert_eq!(customer.customer_id, "cus_9");
        assert_eq!(customer.phone.as_deref(), Some("+15035551234"));
        assert_eq!(customer.shipping_name.as_deref(), Some("Jane Doe"));
        let address = customer.shipping_address.unwrap();
        assert_eq!(address.street, "500 SE Division St, Apt 2");
        assert_eq!(address.city, "Portland");
    }

    #[tokio::test]
    async fn test_customer_updated_without_contact_fields() {
        let normalizer = EventNormalizer::new(Arc::new(MockProcessor::new()));
        let event = normalizer
            .normalize(&raw("customer.updated", serde_json::json!({"id": "cus_9"})))
            .await
            .unwrap();

        let NormalizedEvent::CustomerUpdated(customer) = event else {
            panic!("expected customer event");
        };
        assert!(!customer.has_contact_changes());
        assert!(customer.shipping_address.is_none());
    }

    #[tokio::test]
    async fn test_unknown_kind_ignored() {
        let normalizer = EventNormalizer::new(Arc::new(MockProcessor::new()));
        let event = normalizer
            .normalize(&raw("charge.dispute.created", serde_json::json!({})))
            .await
            .unwrap();
        assert!(matches!(event, NormalizedEvent::Ignored { kind } if kind == "charge.dispute.created"));
    }

    #[test]
    fn test_derive_schedule_priority() {
        assert_eq!(
            derive_schedule(Some("Every 3 weeks"), Some("Every 2 weeks - 12oz"), None, None),
            Some("Every 3 weeks".to_owned())
        );
        assert_eq!(
            derive_schedule(None, Some("Every 2 weeks (12oz)"), None, None),
            Some("Every 2 weeks".to_owned())
        );
        assert_eq!(
            derive_schedule(None, None, Some("month"), Some(1)),
            Some("Every month".to_owned())
        );
        assert_eq!(
            derive_schedule(None, None, Some("week"), Some(2)),
            Some("Every 2 weeks".to_owned())
        );
        assert_eq!(derive_schedule(None, None, None, None), None);
    }

    #[test]
    fn test_derive_schedule_multibyte_nicknames() {
        // Lowercasing 'ẞ' shrinks it from three bytes to two; offsets must
        // come from the original string.
        assert_eq!(
            derive_schedule(None, Some("ẞẞevery month"), None, None),
            Some("every month".to_owned())
        );
        assert_eq!(
            derive_schedule(None, Some("Größe Kaffee - Every 2 weeks"), None, None),
            Some("Every 2 weeks".to_owned())
        );
        assert_eq!(
            derive_schedule(None, Some("Größe Kaffee"), Some("month"), Some(1)),
            Some("Every month".to_owned())
        );
    }

    #[test]
    fn test_map_status() {
        assert_eq!(map_status("active", false), SubscriptionStatus::Active);
        assert_eq!(map_status("active", true), SubscriptionStatus::Paused);
        assert_eq!(map_status("past_due", false), SubscriptionStatus::PastDue);
        assert_eq!(map_status("canceled", false), SubscriptionStatus::Canceled);
        assert_eq!(map_status("trialing", false), SubscriptionStatus::Active);
    }
}
