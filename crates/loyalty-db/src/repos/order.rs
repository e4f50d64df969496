//! Order repository: submission, listing, reconciliation updates

use loyalty_types::{
    OrderKind, OrderNumber, OrderRecord, OrderStatus, OrderSubmission, PendingOrder,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, DbOrderOwner, DbOrderRow, DbPendingRow, DbResult, DecisionApplied};

/// Order repository
#[derive(Clone)]
pub struct OrderRepo {
    pool: PgPool,
}

impl OrderRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a purchase order number for a user.
    ///
    /// Order row and ownership link are written in one transaction.
    pub async fn create(&self, user_id: Uuid, number: &OrderNumber) -> DbResult<OrderSubmission> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (number, kind, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (number) DO NOTHING
            "#
        )
        .bind(number.as_str())
        .bind(OrderKind::Purchase.as_str())
        .bind(OrderStatus::New.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let owner = sqlx::query_as::<_, DbOrderOwner>(
                r#"
                SELECT uo.user_id, o.kind
                FROM orders o
                JOIN user_orders uo ON uo.order_number = o.number
                WHERE o.number = $1
                "#
            )
            .bind(number.as_str())
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;

            return Ok(match owner {
                Some(owner)
                    if owner.user_id == user_id && owner.kind == OrderKind::Purchase.as_str() =>
                {
                    OrderSubmission::AlreadyOwned
                }
                _ => OrderSubmission::OwnedByOther,
            });
        }

        sqlx::query("INSERT INTO user_orders (order_number, user_id) VALUES ($1, $2)")
            .bind(number.as_str())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(OrderSubmission::Accepted)
    }

    /// Purchase orders of a user, newest first
    pub async fn list_by_user(&self, user_id: Uuid) -> DbResult<Vec<OrderRecord>> {
        let rows = sqlx::query_as::<_, DbOrderRow>(
            r#"
            SELECT o.number, o.status, l.accrual, o.created_at
            FROM orders o
            JOIN user_orders uo ON uo.order_number = o.number
            LEFT JOIN ledger l ON l.order_id = o.number
            WHERE uo.user_id = $1 AND o.kind = $2
            ORDER BY o.created_at DESC
            "#
        )
        .bind(user_id)
        .bind(OrderKind::Purchase.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRecord::try_from).collect()
    }

    /// Purchase orders not yet in a terminal status, oldest first
    pub async fn list_pending(&self) -> DbResult<Vec<PendingOrder>> {
        let rows = sqlx::query_as::<_, DbPendingRow>(
            r#"
            SELECT number, status
            FROM orders
            WHERE kind = $1 AND status IN ($2, $3)
            ORDER BY created_at ASC
            "#
        )
        .bind(OrderKind::Purchase.as_str())
        .bind(OrderStatus::New.as_str())
        .bind(OrderStatus::Processing.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PendingOrder::try_from).collect()
    }

    /// Set status and upsert the ledger accrual in one transaction.
    ///
    /// The order row is locked for the duration. Re-applying the current
    /// status is accepted; moving backwards is rejected and nothing is written.
    pub async fn apply_decision(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> DbResult<DecisionApplied> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE number = $1 FOR UPDATE")
                .bind(number.as_str())
                .fetch_optional(&mut *tx)
                .await?;

        let Some(current) = current else {
            return Err(DbError::NotFound(format!("Order {}", number)));
        };
        let current: OrderStatus = current.parse()?;

        if !current.accepts(status) {
            return Err(DbError::InvalidTransition {
                order: number.to_string(),
                from: current,
                to: status,
            });
        }

        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE number = $1")
            .bind(number.as_str())
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO ledger (order_id, accrual)
            VALUES ($1, $2)
            ON CONFLICT (order_id)
            DO UPDATE SET accrual = EXCLUDED.accrual
            "#
        )
        .bind(number.as_str())
        .bind(accrual)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(if current == status {
            DecisionApplied::Reapplied(status)
        } else {
            DecisionApplied::Transitioned { from: current, to: status }
        })
    }
}
