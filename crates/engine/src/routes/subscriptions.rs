//! Subscription actions.
//!
//! `PATCH /api/subscriptions/{id}` with `{"action": "cancel" | "skip" |
//! "resume"}`. The storefront forwards the shopper's identity as a tagged
//! bearer token; ownership of the subscription is checked here.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use artisan_roast_core::SubscriptionId;

use crate::error::{EngineError, Result};
use crate::middleware::AuthenticatedUser;
use crate::models::Subscription;
use crate::services::SubscriptionLifecycle;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Cancel,
    Skip,
    Resume,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: Action,
}

/// PATCH /api/subscriptions/{id}
pub async fn handle_action(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<serde_json::Value>> {
    let id = SubscriptionId::new(id);
    let subscription = state
        .subscriptions()
        .find(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("subscription {id}")))?;
    SubscriptionLifecycle::authorize(&subscription, caller)?;

    match request.action {
        Action::Cancel => cancel(&state, &subscription).await,
        Action::Skip => {
            let resumes_at = state.lifecycle().skip(&subscription).await?;
            Ok(Json(serde_json::json!({
                "status": "paused",
                "resumes_at": resumes_at,
            })))
        }
        Action::Resume => {
            state.lifecycle().resume(&subscription).await?;
            Ok(Json(serde_json::json!({ "status": "active" })))
        }
    }
}

/// Unwind pending orders first, then cancel on both sides. Compensation runs
/// before the processor call so an unreachable processor leaves the
/// subscription intact for a retry instead of half-cancelled.
async fn cancel(state: &AppState, subscription: &Subscription) -> Result<Json<serde_json::Value>> {
    if !subscription.status.can_cancel() {
        return Err(EngineError::InvalidTransition(
            "Can only cancel active or paused subscriptions".to_owned(),
        ));
    }

    let summary = state
        .compensator()
        .compensate(&subscription.processor_subscription_id)
        .await?;
    state.lifecycle().finalize_cancel(subscription).await?;

    Ok(Json(serde_json::json!({
        "status": "canceled",
        "orders_canceled": summary.orders_canceled,
        "orders_refunded": summary.orders_refunded,
        "refunds_unresolved": summary.refunds_unresolved,
    })))
}
