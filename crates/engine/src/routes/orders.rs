//! Order actions.
//!
//! `POST /api/orders/{id}/cancel`. Only pending orders owned by the caller
//! can be cancelled. The refund runs first, then the cancel-and-restock;
//! cancelling a subscription order also closes out the linked subscription
//! so the next renewal does not recreate it.

use axum::extract::{Path, State};
use axum::Json;

use artisan_roast_core::OrderId;

use crate::error::{EngineError, Result};
use crate::middleware::AuthenticatedUser;
use crate::models::CancelOutcome;
use crate::state::AppState;

/// POST /api/orders/{id}/cancel
pub async fn handle_cancel(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let id = OrderId::new(id);
    let order = state
        .orders()
        .find(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("order {id}")))?;
    if order.user_id != Some(caller) {
        return Err(EngineError::Forbidden(
            "order belongs to a different account".to_owned(),
        ));
    }
    if !order.status.cancellable() {
        return Err(EngineError::InvalidTransition(
            "Can only cancel pending orders".to_owned(),
        ));
    }

    let unwound = state.compensator().unwind_order(&order).await?;
    if unwound.outcome == CancelOutcome::NotCancellable {
        // Lost a race with a concurrent cancellation.
        return Err(EngineError::InvalidTransition(
            "Can only cancel pending orders".to_owned(),
        ));
    }
    tracing::info!(
        order_id = %order.id,
        refunded = unwound.refunded,
        refund_unresolved = unwound.refund_unresolved,
        "Order cancelled by customer"
    );

    let mut subscription_canceled = false;
    if let Some(processor_subscription_id) = order.processor_subscription_id.as_deref() {
        subscription_canceled =
            cancel_linked_subscription(&state, processor_subscription_id).await;
    }

    Ok(Json(serde_json::json!({
        "status": "cancelled",
        "refunded": unwound.refunded,
        "refund_unresolved": unwound.refund_unresolved,
        "subscription_canceled": subscription_canceled,
    })))
}

/// Close out the subscription a cancelled order belongs to. Best-effort: the
/// order is already cancelled and refunded, so a failure here is flagged for
/// follow-up rather than unwound.
async fn cancel_linked_subscription(state: &AppState, processor_subscription_id: &str) -> bool {
    match state
        .subscriptions()
        .find_by_processor_id(processor_subscription_id)
        .await
    {
        Ok(Some(subscription)) if subscription.status.can_cancel() => {
            match state.lifecycle().finalize_cancel(&subscription).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::error!(
                        processor_subscription_id,
                        error = %err,
                        "Subscription cancel failed after order cancel"
                    );
                    false
                }
            }
        }
        Ok(Some(_)) => false,
        Ok(None) => {
            tracing::warn!(
                processor_subscription_id,
                "No local subscription for cancelled order"
            );
            false
        }
        Err(err) => {
            tracing::error!(
                processor_subscription_id,
                error = %err,
                "Subscription lookup failed after order cancel"
            );
            false
        }
    }
}
