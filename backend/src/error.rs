//! Error handling for the commerce transaction core
//!
//! One taxonomy for the whole backend: not-found, validation, business-rule
//! conflicts, and ledger violations each map to a stable error code and HTTP
//! status. Coupon validation failures are deliberately not here; an invalid
//! coupon is expected user input and travels as a typed result instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Lookup errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("No price available for variant {variant_id} in {currency}")]
    NoPriceAvailable { variant_id: Uuid, currency: String },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    // Business rule conflicts: callers re-fetch state and retry with
    // corrected input
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error("Insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_id: Uuid,
        requested: i64,
        available: i64,
    },

    // Ledger invariant would be violated; fatal to the operation, never
    // silently clamped
    #[error("Invalid stock adjustment: {0}")]
    InvalidAdjustment(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // External service errors
    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{} not found", resource),
                    field: None,
                },
            ),
            AppError::NoPriceAvailable { variant_id, currency } => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NO_PRICE_AVAILABLE".to_string(),
                    message: format!("No price for variant {} in {}", variant_id, currency),
                    field: None,
                },
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::BusinessRule(message) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "BUSINESS_RULE_VIOLATION".to_string(),
                    message: message.clone(),
                    field: None,
                },
            ),
            AppError::InsufficientStock {
                variant_id,
                requested,
                available,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INSUFFICIENT_STOCK".to_string(),
                    message: format!(
                        "Insufficient stock for variant {}: requested {}, available {}",
                        variant_id, requested, available
                    ),
                    field: None,
                },
            ),
            AppError::InvalidAdjustment(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INVALID_ADJUSTMENT".to_string(),
                    message: message.clone(),
                    field: None,
                },
            ),
            AppError::InvalidStateTransition(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INVALID_STATE_TRANSITION".to_string(),
                    message: message.clone(),
                    field: None,
                },
            ),
            AppError::PaymentGateway(message) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail {
                    code: "PAYMENT_GATEWAY_ERROR".to_string(),
                    message: message.clone(),
                    field: None,
                },
            ),
            AppError::Configuration(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "CONFIGURATION_ERROR".to_string(),
                    message: message.clone(),
                    field: None,
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message: "A database error occurred".to_string(),
                    field: None,
                },
            ),
            AppError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: message.clone(),
                    field: None,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred".to_string(),
                    field: None,
                },
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
