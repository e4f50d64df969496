//! Balance and withdrawal read models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::order::OrderNumber;

/// Live balance of one user, derived from the ledger on every read.
///
/// `current = Σ accrual (PROCESSED) − Σ withdrawn (not INVALID)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub withdrawn: Decimal,
}

impl Balance {
    pub fn new(accrued: Decimal, withdrawn: Decimal) -> Self {
        Self {
            current: accrued - withdrawn,
            withdrawn,
        }
    }

    pub fn covers(&self, amount: Decimal) -> bool {
        amount <= self.current
    }
}

/// A past redemption as listed to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub order: OrderNumber,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

/// Reject withdrawal sums that are zero or negative.
///
/// Sums are rounded to two decimal places, the precision the ledger stores.
pub fn ensure_positive(amount: Decimal) -> DomainResult<Decimal> {
    let amount = amount.round_dp(2);
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(DomainError::InvalidAmount(amount.to_string()))
    }
}
