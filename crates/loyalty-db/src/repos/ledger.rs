//! Ledger repository: balance aggregation and withdrawals

use loyalty_types::{Balance, OrderKind, OrderNumber, OrderStatus, WithdrawalRecord};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{DbError, DbLedgerTotals, DbResult, DbWithdrawalRow};

/// Ledger repository
#[derive(Clone)]
pub struct LedgerRepo {
    pool: PgPool,
}

impl LedgerRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current balance and lifetime withdrawn, computed from the ledger
    pub async fn balance(&self, user_id: Uuid) -> DbResult<Balance> {
        Ok(ledger_totals(&self.pool, user_id).await?.into())
    }

    /// Redeem `sum` points against a synthetic withdrawal order.
    ///
    /// Withdrawals of the same user are serialized by a transaction-scoped
    /// advisory lock, so the sufficiency check and the insert see the same
    /// balance.
    pub async fn withdraw(
        &self,
        user_id: Uuid,
        number: &OrderNumber,
        sum: Decimal,
    ) -> DbResult<Balance> {
        if sum <= Decimal::ZERO {
            return Err(DbError::InvalidInput("Withdrawal sum must be positive".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let balance: Balance = ledger_totals(&mut *tx, user_id).await?.into();
        if !balance.covers(sum) {
            return Err(DbError::InsufficientBalance(format!(
                "requested {}, available {}",
                sum, balance.current
            )));
        }

        sqlx::query("INSERT INTO orders (number, kind, status) VALUES ($1, $2, $3)")
            .bind(number.as_str())
            .bind(OrderKind::Withdrawal.as_str())
            .bind(OrderStatus::Processed.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::Duplicate(_) => {
                    DbError::Duplicate(format!("Order {} already exists", number))
                }
                other => other,
            })?;

        sqlx::query("INSERT INTO user_orders (order_number, user_id) VALUES ($1, $2)")
            .bind(number.as_str())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO ledger (order_id, accrual, withdrawn) VALUES ($1, 0, $2)")
            .bind(number.as_str())
            .bind(sum)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Balance::new(balance.current + balance.withdrawn, balance.withdrawn + sum))
    }

    /// Withdrawals of a user, newest first
    pub async fn withdrawals(&self, user_id: Uuid) -> DbResult<Vec<WithdrawalRecord>> {
        let rows = sqlx::query_as::<_, DbWithdrawalRow>(
            r#"
            SELECT o.number, l.withdrawn, o.created_at
            FROM orders o
            JOIN user_orders uo ON uo.order_number = o.number
            JOIN ledger l ON l.order_id = o.number
            WHERE uo.user_id = $1 AND o.kind = $2
            ORDER BY o.created_at DESC
            "#
        )
        .bind(user_id)
        .bind(OrderKind::Withdrawal.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WithdrawalRecord::try_from).collect()
    }
}

/// `accrual` counts only for PROCESSED orders, `withdrawn` for every order
/// that is not INVALID.
async fn ledger_totals<'e, E>(executor: E, user_id: Uuid) -> DbResult<DbLedgerTotals>
where
    E: PgExecutor<'e>,
{
    let totals = sqlx::query_as::<_, DbLedgerTotals>(
        r#"
        SELECT
            COALESCE(SUM(l.accrual) FILTER (WHERE o.status = 'PROCESSED'), 0) AS accrued,
            COALESCE(SUM(l.withdrawn) FILTER (WHERE o.status <> 'INVALID'), 0) AS withdrawn
        FROM user_orders uo
        JOIN orders o ON o.number = uo.order_number
        JOIN ledger l ON l.order_id = o.number
        WHERE uo.user_id = $1
        "#
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(totals)
}
