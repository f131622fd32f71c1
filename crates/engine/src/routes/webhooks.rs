//! Webhook endpoint.
//!
//! The dispatcher acknowledges with `{"received": true}` once an event is
//! fully handled (or deliberately ignored). Malformed payloads get a 400 and
//! are never retried; transient failures map to 5xx so the processor
//! redelivers, which the idempotency keys make safe. Deliveries for the same
//! subscription are serialized through the keyed lock since the processor
//! gives no ordering guarantee.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::error::{EngineError, Result};
use crate::events::{CustomerEvent, NormalizedEvent, RawEvent, SubscriptionEvent};
use crate::models::{ContactUpdate, Subscription};
use crate::state::AppState;

/// Header carrying the delivery signature.
const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /webhooks/processor
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| EngineError::Unauthorized("missing signature header".to_owned()))?;

    state
        .verifier()
        .verify(&body, signature)
        .map_err(|err| EngineError::Unauthorized(err.to_string()))?;

    let raw: RawEvent = serde_json::from_slice(&body)
        .map_err(|err| EngineError::MalformedEvent(format!("unparseable event envelope: {err}")))?;
    tracing::info!(event_id = ?raw.id, kind = %raw.kind, "Webhook received");

    let event = state.normalizer().normalize(&raw).await?;

    // One guard per subscription (or session, for subscription-less
    // checkouts) for the rest of the handling.
    let _guard = state.locks().acquire(lock_key(&event)).await;

    match event {
        NormalizedEvent::CheckoutCompleted(checkout) => {
            state.materializer().materialize_checkout(&checkout).await?;
        }
        NormalizedEvent::SubscriptionUpdated(update) => {
            handle_subscription_updated(&state, &update).await?;
        }
        NormalizedEvent::SubscriptionCanceled {
            processor_subscription_id,
            canceled_at,
        } => {
            handle_subscription_deleted(&state, &processor_subscription_id, canceled_at).await?;
        }
        NormalizedEvent::InvoicePaid(invoice) => {
            state.materializer().handle_invoice_paid(&invoice).await?;
        }
        NormalizedEvent::CustomerUpdated(customer) => {
            handle_customer_updated(&state, &customer).await?;
        }
        NormalizedEvent::Ignored { kind } => {
            tracing::debug!(kind, "Ignoring uninteresting event");
        }
    }

    Ok(Json(serde_json::json!({ "received": true })))
}

fn lock_key(event: &NormalizedEvent) -> &str {
    match event {
        NormalizedEvent::CheckoutCompleted(checkout) => checkout
            .subscription_id
            .as_deref()
            .unwrap_or(&checkout.session_id),
        NormalizedEvent::SubscriptionUpdated(update) => &update.patch.processor_subscription_id,
        NormalizedEvent::SubscriptionCanceled {
            processor_subscription_id,
            ..
        } => processor_subscription_id,
        NormalizedEvent::InvoicePaid(invoice) => invoice
            .subscription_id
            .as_deref()
            .unwrap_or(&invoice.invoice_id),
        NormalizedEvent::CustomerUpdated(customer) => &customer.customer_id,
        NormalizedEvent::Ignored { kind } => kind,
    }
}

/// A customer scheduling a cancellation through the processor's portal
/// arrives here as cancel-at-period-end flipping on. That is treated as a
/// full cancellation: pending orders are unwound and the subscription is
/// closed out on both sides immediately, rather than letting the processor
/// bill out the remaining period.
async fn handle_subscription_updated(
    state: &AppState,
    update: &SubscriptionEvent,
) -> Result<()> {
    let patch = &update.patch;
    let Some(existing) = state
        .subscriptions()
        .find_by_processor_id(&patch.processor_subscription_id)
        .await?
    else {
        tracing::info!(
            processor_subscription_id = %patch.processor_subscription_id,
            "Update for unknown subscription, skipping"
        );
        return Ok(());
    };

    if cancel_newly_requested(patch.cancel_at_period_end, &existing) {
        tracing::info!(
            subscription_id = %existing.id,
            "Cancellation requested via processor, unwinding pending orders"
        );
        let summary = state
            .compensator()
            .compensate(&patch.processor_subscription_id)
            .await?;
        tracing::info!(
            subscription_id = %existing.id,
            orders_canceled = summary.orders_canceled,
            orders_refunded = summary.orders_refunded,
            refunds_unresolved = summary.refunds_unresolved,
            "Pending orders unwound"
        );
        state.lifecycle().finalize_cancel(&existing).await?;
        return Ok(());
    }

    state.lifecycle().apply_update(patch).await?;
    Ok(())
}

/// The customer changed their shipping address or phone at the processor.
/// Fan the new contact details out to the customer's subscriptions and any
/// pending orders, and push the address into each subscription's processor
/// metadata so the next renewal ships to the right place.
async fn handle_customer_updated(state: &AppState, customer: &CustomerEvent) -> Result<()> {
    if !customer.has_contact_changes() {
        tracing::debug!(
            processor_customer_id = %customer.customer_id,
            "Customer update carries no contact changes, skipping"
        );
        return Ok(());
    }

    let update = ContactUpdate {
        // The shipping profile name only means something next to an address.
        recipient_name: customer
            .shipping_address
            .as_ref()
            .and(customer.shipping_name.clone()),
        phone: customer.phone.clone(),
        shipping_address: customer.shipping_address.clone(),
    };

    let subscriptions = state
        .subscriptions()
        .for_processor_customer(&customer.customer_id)
        .await?;
    let subscriptions_updated = subscriptions.len();
    for subscription in subscriptions {
        state
            .subscriptions()
            .update_recipient_contact(subscription.id, &update)
            .await?;
        if let Some(address) = &update.shipping_address {
            state
                .lifecycle()
                .publish_shipping(
                    &subscription.processor_subscription_id,
                    update.recipient_name.as_deref(),
                    address,
                )
                .await;
        }
    }

    let orders_updated = state
        .orders()
        .update_pending_contact(&customer.customer_id, &update)
        .await?;

    tracing::info!(
        processor_customer_id = %customer.customer_id,
        subscriptions_updated,
        orders_updated,
        "Customer contact changes propagated"
    );
    Ok(())
}

fn cancel_newly_requested(patched: bool, existing: &Subscription) -> bool {
    patched && !existing.cancel_at_period_end && existing.status.can_cancel()
}

/// The processor deleted the subscription (portal cancel taking effect, or
/// payment failure exhaustion). Nothing left to cancel on their side; unwind
/// pending orders and close the local record.
async fn handle_subscription_deleted(
    state: &AppState,
    processor_subscription_id: &str,
    canceled_at: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<()> {
    let summary = state
        .compensator()
        .compensate(processor_subscription_id)
        .await?;
    tracing::info!(
        processor_subscription_id,
        orders_canceled = summary.orders_canceled,
        orders_refunded = summary.orders_refunded,
        refunds_unresolved = summary.refunds_unresolved,
        "Subscription deleted at processor"
    );
    state
        .lifecycle()
        .mark_canceled(processor_subscription_id, canceled_at)
        .await?;
    Ok(())
}
