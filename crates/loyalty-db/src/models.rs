//! Database models - mapped from PostgreSQL tables

use chrono::{DateTime, Utc};
use loyalty_types::{
    Balance, OrderNumber, OrderRecord, OrderStatus, PendingOrder, WithdrawalRecord,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::DbError;

// ============================================================================
// User Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DbUser {
    pub id: Uuid,
    pub login: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Order Models
// ============================================================================

/// A purchase order joined with its ledger entry
#[derive(Debug, Clone, FromRow)]
pub struct DbOrderRow {
    pub number: String,
    pub status: String,
    pub accrual: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbOrderRow> for OrderRecord {
    type Error = DbError;

    fn try_from(row: DbOrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row.status.parse()?;
        Ok(OrderRecord {
            number: OrderNumber::parse(&row.number)?,
            status,
            accrual: match status {
                OrderStatus::Processed => Some(row.accrual.unwrap_or(Decimal::ZERO)),
                _ => None,
            },
            uploaded_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPendingRow {
    pub number: String,
    pub status: String,
}

impl TryFrom<DbPendingRow> for PendingOrder {
    type Error = DbError;

    fn try_from(row: DbPendingRow) -> Result<Self, Self::Error> {
        Ok(PendingOrder {
            number: OrderNumber::parse(&row.number)?,
            status: row.status.parse()?,
        })
    }
}

/// Owner and kind of an existing order, used to classify resubmissions
#[derive(Debug, Clone, FromRow)]
pub struct DbOrderOwner {
    pub user_id: Uuid,
    pub kind: String,
}

// ============================================================================
// Ledger Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbWithdrawalRow {
    pub number: String,
    pub withdrawn: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbWithdrawalRow> for WithdrawalRecord {
    type Error = DbError;

    fn try_from(row: DbWithdrawalRow) -> Result<Self, Self::Error> {
        Ok(WithdrawalRecord {
            order: OrderNumber::parse(&row.number)?,
            sum: row.withdrawn,
            processed_at: row.created_at,
        })
    }
}

/// Per-user ledger sums
#[derive(Debug, Clone, Copy, FromRow)]
pub struct DbLedgerTotals {
    pub accrued: Decimal,
    pub withdrawn: Decimal,
}

impl From<DbLedgerTotals> for Balance {
    fn from(totals: DbLedgerTotals) -> Self {
        Balance::new(totals.accrued, totals.withdrawn)
    }
}
