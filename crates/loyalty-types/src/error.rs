//! Domain error types

use thiserror::Error;

/// Result type for domain validation
pub type DomainResult<T> = std::result::Result<T, DomainError>;

/// Validation failures. These are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Order number is empty, contains non-digits, or fails the checksum
    #[error("Invalid order number: {0:?}")]
    InvalidOrderNumber(String),

    /// Withdrawal sum is zero or negative
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Unknown status representation
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// Unknown order kind representation
    #[error("Unknown order kind: {0}")]
    UnknownKind(String),
}
