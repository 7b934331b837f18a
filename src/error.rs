use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::BookingStatus;

/// Shared error-message constants so gateway clients and handlers agree on wording.
pub mod msg {
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature header format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature header";
    pub const INVALID_WEBHOOK_SECRET: &str = "Webhook secret rejected by HMAC";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Webhook authenticity check failed. Surfaced as a request rejection;
    /// the gateway may retry delivery but it will fail identically.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Event metadata carried no booking id. The event is dropped and
    /// acknowledged since there is nothing actionable.
    #[error("Event {0} carries no booking reference")]
    MissingBookingReference(String),

    /// An optimistic booking transition lost a race against another event.
    /// Callers treat this as "already handled", not as a failure.
    #[error("Booking {booking_id}: expected status {expected}, found {actual}")]
    StatusConflict {
        booking_id: String,
        expected: BookingStatus,
        actual: BookingStatus,
    },

    #[error("Refund of {requested_minor} exceeds the {available_minor} still refundable")]
    RefundAmountExceeded {
        requested_minor: i64,
        available_minor: i64,
    },

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for failures that must bubble to the transport layer as 5xx so
    /// the gateway retries delivery. Everything else is a logic-level
    /// rejection or no-op that should be acknowledged.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Pool(_) | AppError::Gateway(_) | AppError::Internal(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "Not found", Some(m.clone())),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, "Bad request", Some(m.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "Conflict", Some(m.clone())),
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, "Invalid signature", None),
            AppError::MissingBookingReference(_) => (
                StatusCode::BAD_REQUEST,
                "Missing booking reference",
                Some(self.to_string()),
            ),
            AppError::StatusConflict { .. } => (
                StatusCode::CONFLICT,
                "Status conflict",
                Some(self.to_string()),
            ),
            AppError::RefundAmountExceeded { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Refund amount exceeded",
                Some(self.to_string()),
            ),
            AppError::Gateway(m) => {
                tracing::error!("Gateway error: {}", m);
                (StatusCode::BAD_GATEWAY, "Payment gateway error", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(m) => {
                tracing::error!("Internal error: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
