//! Error types for the pay-later backend
//!
//! `ServiceError` is the business-rule taxonomy returned by the services.
//! `ApiError` is the HTTP boundary type with status code mapping and a JSON
//! body; every `ServiceError` converts into one.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Business-rule failures surfaced synchronously to the caller
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Loan request exceeds the credit limit of {ceiling}. You have {} left.", remaining_credit(.used, .ceiling))]
    LimitExceeded {
        requested: Decimal,
        used: Decimal,
        ceiling: Decimal,
    },

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Credit still available when the ceiling check failed
    pub fn headroom(&self) -> Option<Decimal> {
        match self {
            ServiceError::LimitExceeded { used, ceiling, .. } => {
                Some(remaining_credit(used, ceiling))
            }
            _ => None,
        }
    }
}

/// Credit left under `ceiling`; zero once usage is at or above it
pub fn remaining_credit(used: &Decimal, ceiling: &Decimal) -> Decimal {
    (*ceiling - *used).max(Decimal::ZERO)
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Duplicate(what) => ServiceError::Conflict(what),
            StoreError::Database(msg) => ServiceError::Internal(msg),
        }
    }
}

/// Errors as they leave the HTTP boundary
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    LimitExceeded(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests, slow down")]
    TooManyRequests,

    #[error("{0}")]
    InternalError(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, "LIMIT_EXCEEDED"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        }
    }

    /// Stable machine-readable code, e.g. `LIMIT_EXCEEDED`
    pub fn error_code(&self) -> &'static str {
        self.classify().1
    }

    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        // Internal detail stays in the logs
        let message = match &self {
            ApiError::InternalError(detail) => {
                tracing::error!(error = %detail, code, "Request failed with internal error");
                "Something went wrong, please try again later".to_string()
            }
            ApiError::ServiceUnavailable(detail) => {
                tracing::error!(error = %detail, code, "Dependency unavailable");
                self.to_string()
            }
            _ => {
                tracing::debug!(error = %self, code, "Request rejected");
                self.to_string()
            }
        };

        let body = ErrorBody {
            success: false,
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::NotFound(_) => ApiError::NotFound(message),
            ServiceError::Forbidden(_) => ApiError::Forbidden(message),
            ServiceError::InvalidInput(_) => ApiError::BadRequest(message),
            ServiceError::Unauthorized(_) => ApiError::Unauthorized(message),
            ServiceError::LimitExceeded { .. } => ApiError::LimitExceeded(message),
            ServiceError::InvalidState(_) | ServiceError::Conflict(_) => {
                ApiError::Conflict(message)
            }
            ServiceError::Internal(_) => ApiError::InternalError(message),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ServiceError::from(err).into()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;
