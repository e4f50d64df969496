//! Orders: numbers, statuses, kinds

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Checksum
// ============================================================================

/// Mod-10 checksum (Luhn), scanned from the rightmost digit.
///
/// Every second digit counting from the right (starting with the one next to
/// the check digit) is doubled, with 9 subtracted when the result exceeds 9.
/// The number is valid when the total is a multiple of 10.
///
/// Empty input and any non-digit character yield `false`.
pub fn is_valid_order_number(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    let mut sum = 0u32;
    for (position, ch) in number.chars().rev().enumerate() {
        let Some(mut digit) = ch.to_digit(10) else {
            return false;
        };
        if position % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }

    sum % 10 == 0
}

// ============================================================================
// Order Number
// ============================================================================

/// An order number that has passed the checksum.
///
/// Used as the primary key of orders, both purchases and withdrawals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Validate and wrap an order number. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if is_valid_order_number(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(DomainError::InvalidOrderNumber(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Order Status
// ============================================================================

/// Settlement status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Submitted, not yet seen by the accrual authority
    New,
    /// Authority is still deciding
    Processing,
    /// Accrual decided; counts toward the balance
    Processed,
    /// Authority rejected the order
    Invalid,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::New,
        OrderStatus::Processing,
        OrderStatus::Processed,
        OrderStatus::Invalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Invalid => "INVALID",
        }
    }

    /// Terminal orders are never polled again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Invalid)
    }

    /// Whether `self → next` is a legal forward transition.
    ///
    /// Staying in the same status is not a transition; see [`OrderStatus::accepts`].
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (Self::New, Self::Processing | Self::Processed | Self::Invalid) => true,
            (Self::Processing, Self::Processed | Self::Invalid) => true,
            _ => false,
        }
    }

    /// Whether a decision reporting `next` may be applied to an order in `self`,
    /// including an idempotent re-application of the current status.
    pub fn accepts(&self, next: OrderStatus) -> bool {
        *self == next || self.can_transition_to(next)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "PROCESSING" => Ok(Self::Processing),
            "PROCESSED" => Ok(Self::Processed),
            "INVALID" => Ok(Self::Invalid),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Order Kind
// ============================================================================

/// What an order row represents.
///
/// A withdrawal is recorded as a synthetic, already-terminal order whose
/// ledger entry carries the redeemed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Purchase,
    Withdrawal,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "withdrawal" => Ok(Self::Withdrawal),
            other => Err(DomainError::UnknownKind(other.to_string())),
        }
    }
}

// ============================================================================
// Read Models
// ============================================================================

/// A purchase order as listed to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub number: OrderNumber,
    pub status: OrderStatus,
    /// Present only once the order is `PROCESSED`
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

/// Result of submitting a purchase order number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSubmission {
    /// Newly recorded with status `NEW`
    Accepted,
    /// The same user already submitted this number
    AlreadyOwned,
    /// Another user owns this number
    OwnedByOther,
}

/// A pending order handed to the reconciliation agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOrder {
    pub number: OrderNumber,
    pub status: OrderStatus,
}
