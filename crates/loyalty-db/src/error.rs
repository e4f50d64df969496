//! Database error types and retry classification

use loyalty_types::{DomainError, OrderStatus};
use thiserror::Error;

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(sqlx::Error),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Invalid status transition for order {order}: {from} -> {to}")]
    InvalidTransition {
        order: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Injected failure, used by the in-memory store
    #[cfg(any(test, feature = "mock"))]
    #[error("Simulated failure (retriable: {retriable})")]
    Simulated { retriable: bool },
}

impl DbError {
    /// Whether the operation may succeed if attempted again unchanged.
    ///
    /// Connection loss, admin shutdown, serialization failures, deadlocks and
    /// per-attempt timeouts are retriable. Everything else is fatal.
    pub fn is_retriable(&self) -> bool {
        match self {
            DbError::Query(e) => is_retriable_sqlx(e),
            DbError::Timeout(_) => true,
            #[cfg(any(test, feature = "mock"))]
            DbError::Simulated { retriable } => *retriable,
            _ => false,
        }
    }
}

fn is_retriable_sqlx(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| is_retriable_sqlstate(&code))
            .unwrap_or(false),
        _ => false,
    }
}

/// SQLSTATE codes worth retrying: class 08 (connection exception),
/// 57P01 (admin shutdown), 40001 (serialization failure), 40P01 (deadlock).
pub fn is_retriable_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "40001" | "40P01")
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            let detail = match db_err.constraint() {
                Some(constraint) => format!("{} ({})", db_err.message(), constraint),
                None => db_err.message().to_string(),
            };
            match db_err.code().as_deref() {
                Some("23505") => return DbError::Duplicate(detail),
                Some(code) if code.starts_with("23") => return DbError::Constraint(detail),
                _ => {}
            }
        }
        DbError::Query(e)
    }
}

impl From<DomainError> for DbError {
    fn from(e: DomainError) -> Self {
        DbError::Serialization(e.to_string())
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
