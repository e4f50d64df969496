//! Storage seams used by the reconciliation agent and the HTTP layer
//!
//! Callers hold `Arc<dyn LedgerStore>` / `Arc<dyn UserStore>`. The Postgres
//! implementation lives here; an in-memory one is available behind the
//! `mock` feature, and [`crate::Retrying`] decorates either with the retry
//! policy.

use async_trait::async_trait;
use loyalty_types::{
    Balance, OrderNumber, OrderRecord, OrderStatus, OrderSubmission, PendingOrder, UserId,
    WithdrawalRecord,
};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::{DbResult, DbUser, LedgerRepo, OrderRepo, UserRepo};

/// What `apply_decision` did to the order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionApplied {
    /// Status moved forward
    Transitioned { from: OrderStatus, to: OrderStatus },
    /// Status was already the decided one; the ledger entry was rewritten
    Reapplied(OrderStatus),
}

/// Orders, ledger entries and the balances derived from them
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Record a purchase order with status `NEW`, linked to `user`
    async fn create_order(&self, user: UserId, number: &OrderNumber) -> DbResult<OrderSubmission>;

    /// Purchase orders of `user`, newest first
    async fn list_orders(&self, user: UserId) -> DbResult<Vec<OrderRecord>>;

    /// Every purchase order not yet terminal, oldest first
    async fn pending_orders(&self) -> DbResult<Vec<PendingOrder>>;

    /// Atomically set the order status and upsert its ledger accrual.
    ///
    /// Idempotent: applying the same decision twice leaves the same state.
    async fn apply_decision(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> DbResult<DecisionApplied>;

    /// Live balance of `user`, never cached
    async fn fetch_balance(&self, user: UserId) -> DbResult<Balance>;

    /// Redeem `sum` against a new synthetic withdrawal order.
    ///
    /// Fails with `InsufficientBalance` when `sum` exceeds the balance and
    /// with `Duplicate` when `number` is already taken. Returns the balance
    /// after the withdrawal.
    async fn register_withdraw(
        &self,
        user: UserId,
        number: &OrderNumber,
        sum: Decimal,
    ) -> DbResult<Balance>;

    /// Withdrawals of `user`, newest first
    async fn list_withdrawals(&self, user: UserId) -> DbResult<Vec<WithdrawalRecord>>;
}

/// Registered users
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Duplicate` when the login is taken
    async fn create_user(&self, login: &str, password_hash: &str) -> DbResult<DbUser>;

    async fn find_user_by_login(&self, login: &str) -> DbResult<Option<DbUser>>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgLedgerStore {
    orders: OrderRepo,
    ledger: LedgerRepo,
    users: UserRepo,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            orders: OrderRepo::new(pool.clone()),
            ledger: LedgerRepo::new(pool.clone()),
            users: UserRepo::new(pool),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn create_order(&self, user: UserId, number: &OrderNumber) -> DbResult<OrderSubmission> {
        self.orders.create(user, number).await
    }

    async fn list_orders(&self, user: UserId) -> DbResult<Vec<OrderRecord>> {
        self.orders.list_by_user(user).await
    }

    async fn pending_orders(&self) -> DbResult<Vec<PendingOrder>> {
        self.orders.list_pending().await
    }

    async fn apply_decision(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> DbResult<DecisionApplied> {
        self.orders.apply_decision(number, status, accrual).await
    }

    async fn fetch_balance(&self, user: UserId) -> DbResult<Balance> {
        self.ledger.balance(user).await
    }

    async fn register_withdraw(
        &self,
        user: UserId,
        number: &OrderNumber,
        sum: Decimal,
    ) -> DbResult<Balance> {
        self.ledger.withdraw(user, number, sum).await
    }

    async fn list_withdrawals(&self, user: UserId) -> DbResult<Vec<WithdrawalRecord>> {
        self.ledger.withdrawals(user).await
    }
}

#[async_trait]
impl UserStore for PgLedgerStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> DbResult<DbUser> {
        self.users.create(login, password_hash).await
    }

    async fn find_user_by_login(&self, login: &str) -> DbResult<Option<DbUser>> {
        self.users.find_by_login(login).await
    }
}
