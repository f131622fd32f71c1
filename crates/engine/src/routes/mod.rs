//! HTTP routes.

pub mod orders;
pub mod subscriptions;
pub mod webhooks;

use axum::routing::{get, patch, post};
use axum::{Json, Router};

use crate::state::AppState;

/// Build the engine's router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/processor", post(webhooks::handle_webhook))
        .route(
            "/api/subscriptions/{id}",
            patch(subscriptions::handle_action),
        )
        .route("/api/orders/{id}/cancel", post(orders::handle_cancel))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
