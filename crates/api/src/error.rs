//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orchestrator::OrchestratorError;
use serde_json::{Value, json};
use thiserror::Error;

/// Machine-readable error codes carried in the `error` field.
pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const INSUFFICIENT_STOCK: &str = "insufficient_stock";
    pub const INVALID_TRANSITION: &str = "invalid_transition";
    pub const INVENTORY_UNAVAILABLE: &str = "inventory_unavailable";
    pub const COMPENSATION_FAILED: &str = "compensation_failed";
    pub const ORPHANED_RESERVATION: &str = "orphaned_reservation";
    pub const INTERNAL: &str = "internal";
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be parsed.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Value) {
        let err = match self {
            ApiError::BadRequest(_) => {
                return (StatusCode::BAD_REQUEST, codes::INVALID_REQUEST, json!({}));
            }
            ApiError::Orchestrator(err) => err,
        };

        match err {
            OrchestratorError::OrderNotFound(id) => (
                StatusCode::NOT_FOUND,
                codes::NOT_FOUND,
                json!({ "order_id": id }),
            ),
            OrchestratorError::ProductNotFound(id) => (
                StatusCode::NOT_FOUND,
                codes::NOT_FOUND,
                json!({ "product_id": id }),
            ),
            OrchestratorError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, codes::INVALID_REQUEST, json!({}))
            }
            OrchestratorError::InsufficientStock {
                product_id,
                requested,
                available,
            } => (
                StatusCode::CONFLICT,
                codes::INSUFFICIENT_STOCK,
                json!({
                    "product_id": product_id,
                    "requested": requested,
                    "available": available,
                }),
            ),
            OrchestratorError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                codes::INVALID_TRANSITION,
                json!({ "from": from, "to": to }),
            ),
            OrchestratorError::TransportFailure(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                codes::INVENTORY_UNAVAILABLE,
                json!({}),
            ),
            OrchestratorError::CompensationFailed { order_id, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::COMPENSATION_FAILED,
                json!({ "order_id": order_id }),
            ),
            OrchestratorError::OrphanedReservation { order_id, lines } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::ORPHANED_RESERVATION,
                json!({ "order_id": order_id, "lines": lines }),
            ),
            OrchestratorError::Store(_) | OrchestratorError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL, json!({}))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, fields) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }

        let mut body = json!({ "error": code, "message": self.to_string() });
        if let (Some(body), Value::Object(fields)) = (body.as_object_mut(), fields) {
            body.extend(fields);
        }
        (status, Json(body)).into_response()
    }
}
