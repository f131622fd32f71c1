//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, EngineError>`; the `IntoResponse` impl
//! maps each variant to a status code and captures server-class errors to
//! Sentry before responding. Webhook handler failures deliberately map to
//! 5xx so the processor redelivers; idempotency keys make redelivery safe.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::events::NormalizeError;
use crate::processor::ProcessorError;
use crate::store::StoreError;

/// Application-level error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A webhook payload is missing identifying fields or carries data the
    /// engine cannot interpret. Fatal for the event; never retried locally.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// A subscription action was requested from a state that does not allow
    /// it. The message is shown to the caller.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// The caller does not own the resource they are acting on.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller's identity tag is missing or fails verification.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Outbound processor call failed.
    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<NormalizeError> for EngineError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::Malformed(msg) => Self::MalformedEvent(msg),
            NormalizeError::Processor(err) => Self::Processor(err),
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Store(_) | Self::Internal(_) | Self::Processor(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::MalformedEvent(_) | Self::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Processor(ProcessorError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Processor(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Store(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Processor(_) => "Payment processor error".to_string(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: EngineError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            get_status(EngineError::MalformedEvent("no id".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(EngineError::InvalidTransition(
                "Can only skip billing on active subscriptions".to_string()
            )),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(EngineError::Forbidden("not your subscription".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(EngineError::NotFound("subscription 42".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(EngineError::Unauthorized("missing identity".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(EngineError::Internal("oops".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_processor_timeout_maps_to_gateway_timeout() {
        let err = EngineError::Processor(ProcessorError::Timeout {
            operation: "refund_transaction",
        });
        assert_eq!(get_status(err), StatusCode::GATEWAY_TIMEOUT);

        let err = EngineError::Processor(ProcessorError::Rejected {
            status: Some(402),
            message: "charge already refunded".to_string(),
        });
        assert_eq!(get_status(err), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_internal_details_not_exposed() {
        let response =
            EngineError::Internal("connection string leaked".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
