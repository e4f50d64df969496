//! API error handling
//!
//! Every failure leaves the API as `{code, msg}` with a stable numeric code
//! per error kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use loyalty_auth::AuthError;
use loyalty_db::DbError;
use loyalty_types::DomainError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    // =========================================================================
    // Authentication (1000-1099)
    // =========================================================================
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid login or password")]
    InvalidCredentials,

    // =========================================================================
    // Request (1100-1199)
    // =========================================================================
    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Order number is required")]
    MissingOrderNumber,

    #[error("Password rejected: {0}")]
    PasswordTooWeak(String),

    // =========================================================================
    // Domain (1200-1299)
    // =========================================================================
    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(String),

    #[error("Invalid withdrawal sum: {0}")]
    InvalidAmount(String),

    // =========================================================================
    // Conflicts (1300-1399)
    // =========================================================================
    #[error("Login already taken")]
    LoginTaken,

    #[error("Order was uploaded by another user")]
    OrderOwnedByOther,

    #[error("Conflict: {0}")]
    Conflict(String),

    // =========================================================================
    // Ledger (1400-1499)
    // =========================================================================
    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Not found: {0}")]
    NotFound(String),

    // =========================================================================
    // Internal (5000-5099)
    // =========================================================================
    #[error("Internal server error")]
    Internal,

    #[error("Service temporarily unavailable")]
    ServiceUnavailable,
}

impl ApiError {
    pub fn error_code(&self) -> i32 {
        match self {
            Self::Unauthorized => 1001,
            Self::InvalidCredentials => 1002,

            Self::InvalidRequestBody(_) => 1100,
            Self::ValidationError(_) => 1101,
            Self::MissingOrderNumber => 1102,
            Self::PasswordTooWeak(_) => 1103,

            Self::InvalidOrderNumber(_) => 1200,
            Self::InvalidAmount(_) => 1201,

            Self::LoginTaken => 1300,
            Self::OrderOwnedByOther => 1301,
            Self::Conflict(_) => 1302,

            Self::InsufficientBalance => 1400,
            Self::NotFound(_) => 1404,

            Self::Internal => 5000,
            Self::ServiceUnavailable => 5001,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_)
            | Self::ValidationError(_)
            | Self::MissingOrderNumber
            | Self::PasswordTooWeak(_) => StatusCode::BAD_REQUEST,

            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,

            Self::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,

            Self::NotFound(_) => StatusCode::NOT_FOUND,

            Self::LoginTaken | Self::OrderOwnedByOther | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }

            Self::InvalidOrderNumber(_) | Self::InvalidAmount(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub msg: String,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.error_code(),
            msg: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::from(&self))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::TokenExpired | AuthError::InvalidToken | AuthError::Unauthenticated => {
                Self::Unauthorized
            }
            AuthError::WeakPassword(msg) => Self::PasswordTooWeak(msg),
            other => {
                tracing::error!(error = %other, "Authentication failure");
                Self::Internal
            }
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::InsufficientBalance(_) => Self::InsufficientBalance,
            DbError::Duplicate(msg) => Self::Conflict(msg),
            DbError::InvalidInput(msg) => Self::InvalidAmount(msg),
            DbError::NotFound(msg) => Self::NotFound(msg),
            other if other.is_retriable() => {
                tracing::warn!(error = %other, "Storage unavailable");
                Self::ServiceUnavailable
            }
            other => {
                tracing::error!(error = ?other, "Database error");
                Self::Internal
            }
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidOrderNumber(number) => Self::InvalidOrderNumber(number),
            DomainError::InvalidAmount(amount) => Self::InvalidAmount(amount),
            other => {
                tracing::error!(error = %other, "Unexpected domain error");
                Self::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::InsufficientBalance.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            ApiError::InvalidOrderNumber("1".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError::OrderOwnedByOther.status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::MissingOrderNumber.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_db_error_mapping() {
        assert!(matches!(
            ApiError::from(DbError::InsufficientBalance("x".into())),
            ApiError::InsufficientBalance
        ));
        assert!(matches!(
            ApiError::from(DbError::Duplicate("x".into())),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(DbError::Timeout("x".into())),
            ApiError::ServiceUnavailable
        ));
        assert!(matches!(
            ApiError::from(DbError::Serialization("x".into())),
            ApiError::Internal
        ));
    }

    #[test]
    fn test_error_body() {
        let body = ErrorResponse::from(&ApiError::InsufficientBalance);
        assert_eq!(body.code, 1400);
        assert_eq!(body.msg, "Insufficient balance");
    }
}
