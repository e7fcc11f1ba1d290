//! Error types for the kiosk server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes returned to kiosk, host and admin clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    StoreUnavailable = 3,
    NotFound = 4,
    BadValue = 5,
    AlreadyCheckedOut = 6,
    VisitUnconfirmed = 7,
    TokenExhaustion = 8,
    InvalidToken = 9,
    TokenAlreadyUsed = 10,
    TokenExpired = 11,
    TooManyAttempts = 12,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Informational: the visit was already closed, typically by a concurrent request
    #[error("Visit {0} has already been checked out")]
    AlreadyCheckedOut(i64),

    #[error("Visit {0} was marked as unconfirmed")]
    VisitUnconfirmed(i64),

    #[error("Could not generate a unique QR token after {0} attempts")]
    TokenExhaustion(u32),

    #[error("Invalid action token")]
    InvalidToken,

    #[error("Action token has already been used")]
    TokenAlreadyUsed,

    #[error("Action token has expired")]
    TokenExpired,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Too many login attempts, retry in {0} seconds")]
    TooManyAttempts(u64),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl AppError {
    fn parts(&self) -> (StatusCode, ErrorCode, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NotFound, msg.clone()),
            AppError::AlreadyCheckedOut(_) => (
                StatusCode::CONFLICT,
                ErrorCode::AlreadyCheckedOut,
                "This visit has already been checked out.".to_string(),
            ),
            AppError::VisitUnconfirmed(_) => (
                StatusCode::CONFLICT,
                ErrorCode::VisitUnconfirmed,
                "This visit was marked as unconfirmed. Please contact reception.".to_string(),
            ),
            AppError::TokenExhaustion(attempts) => {
                tracing::error!("QR token generation exhausted after {} attempts", attempts);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::TokenExhaustion,
                    "Check-in could not be completed. Please try again.".to_string(),
                )
            }
            AppError::InvalidToken => (
                StatusCode::NOT_FOUND,
                ErrorCode::InvalidToken,
                "This link is invalid.".to_string(),
            ),
            AppError::TokenAlreadyUsed => (
                StatusCode::CONFLICT,
                ErrorCode::TokenAlreadyUsed,
                "This link has already been used.".to_string(),
            ),
            AppError::TokenExpired => (
                StatusCode::GONE,
                ErrorCode::TokenExpired,
                "This link has expired.".to_string(),
            ),
            AppError::StoreUnavailable(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::StoreUnavailable,
                    "Service temporarily unavailable. Please try again later.".to_string(),
                )
            }
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::TooManyAttempts(_) => {
                (StatusCode::TOO_MANY_REQUESTS, ErrorCode::TooManyAttempts, self.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
