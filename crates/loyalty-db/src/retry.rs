//! Fixed-schedule retry policy and the retrying store decorator
//!
//! A unit of work is attempted once, then once more after each delay of the
//! schedule, as long as it keeps failing with a retriable error. A fatal
//! error returns immediately and leaves the remaining delays unused.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use loyalty_types::{
    Balance, OrderNumber, OrderRecord, OrderStatus, OrderSubmission, PendingOrder, UserId,
    WithdrawalRecord,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{DbError, DbResult, DbUser, DecisionApplied, LedgerStore, UserStore};

/// Anything that can tell whether repeating the failed call may help
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

impl Retriable for DbError {
    fn is_retriable(&self) -> bool {
        DbError::is_retriable(self)
    }
}

/// Storage retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Delays between attempts, in order
    pub retry_delays_ms: Vec<u64>,
    /// Upper bound for a single attempt
    pub operation_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retry_delays_ms: vec![1000, 3000, 5000],
            operation_timeout_ms: 5000,
        }
    }
}

impl StorageConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_delays_ms.iter().copied().map(Duration::from_millis))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Bounded, fixed-delay retry schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        StorageConfig::default().policy()
    }
}

impl RetryPolicy {
    pub fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: delays.into_iter().collect(),
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    /// Run `work` until it succeeds, fails fatally, or the schedule is used up.
    ///
    /// On exhaustion the error of the last attempt is returned.
    pub async fn run<T, E, F, Fut>(&self, operation: &'static str, mut work: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retriable + Display,
    {
        let mut delays = self.delays.iter();
        let mut attempt = 1u32;

        loop {
            let err = match work().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retriable() => return Err(err),
                Err(err) => err,
            };

            let Some(delay) = delays.next() else {
                warn!(operation, attempts = attempt, error = %err, "Retries exhausted");
                return Err(err);
            };

            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retriable storage failure"
            );
            metrics::counter!("loyalty_storage_retries_total", "operation" => operation)
                .increment(1);

            tokio::time::sleep(*delay).await;
            attempt += 1;
        }
    }
}

// ============================================================================
// Decorator
// ============================================================================

/// Wraps a store so that every call runs under a [`RetryPolicy`] with a
/// per-attempt timeout. A timed-out attempt counts as retriable.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
    timeout: Duration,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }

    pub fn from_config(inner: S, config: &StorageConfig) -> Self {
        Self::new(inner, config.policy(), config.operation_timeout())
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn attempt<T, Fut>(&self, operation: &'static str, fut: Fut) -> DbResult<T>
    where
        Fut: Future<Output = DbResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                debug!(operation, timeout_ms = self.timeout.as_millis() as u64, "Attempt timed out");
                Err(DbError::Timeout(operation.to_string()))
            }
        }
    }

    /// Like [`attempt`](Self::attempt), but records in `timed_out` whether
    /// any attempt was abandoned. An abandoned write may still have committed.
    async fn tracked_attempt<T, Fut>(
        &self,
        operation: &'static str,
        timed_out: &AtomicBool,
        fut: Fut,
    ) -> DbResult<T>
    where
        Fut: Future<Output = DbResult<T>>,
    {
        let result = self.attempt(operation, fut).await;
        if matches!(result, Err(DbError::Timeout(_))) {
            timed_out.store(true, Ordering::Relaxed);
        }
        result
    }
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for Retrying<S> {
    async fn create_order(&self, user: UserId, number: &OrderNumber) -> DbResult<OrderSubmission> {
        self.policy
            .run("create_order", || {
                self.attempt("create_order", self.inner.create_order(user, number))
            })
            .await
    }

    async fn list_orders(&self, user: UserId) -> DbResult<Vec<OrderRecord>> {
        self.policy
            .run("list_orders", || self.attempt("list_orders", self.inner.list_orders(user)))
            .await
    }

    async fn pending_orders(&self) -> DbResult<Vec<PendingOrder>> {
        self.policy
            .run("pending_orders", || {
                self.attempt("pending_orders", self.inner.pending_orders())
            })
            .await
    }

    async fn apply_decision(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> DbResult<DecisionApplied> {
        self.policy
            .run("apply_decision", || {
                self.attempt(
                    "apply_decision",
                    self.inner.apply_decision(number, status, accrual),
                )
            })
            .await
    }

    async fn fetch_balance(&self, user: UserId) -> DbResult<Balance> {
        self.policy
            .run("fetch_balance", || {
                self.attempt("fetch_balance", self.inner.fetch_balance(user))
            })
            .await
    }

    async fn register_withdraw(
        &self,
        user: UserId,
        number: &OrderNumber,
        sum: Decimal,
    ) -> DbResult<Balance> {
        let timed_out = AtomicBool::new(false);
        let result = self
            .policy
            .run("register_withdraw", || {
                self.tracked_attempt(
                    "register_withdraw",
                    &timed_out,
                    self.inner.register_withdraw(user, number, sum),
                )
            })
            .await;

        match result {
            Err(DbError::Duplicate(msg)) if timed_out.load(Ordering::Relaxed) => {
                // The abandoned attempt may be the one that took the number
                let committed = self
                    .list_withdrawals(user)
                    .await?
                    .iter()
                    .any(|w| w.order == *number && w.sum == sum);
                if !committed {
                    return Err(DbError::Duplicate(msg));
                }
                info!(order = %number, "Withdrawal committed by a timed-out attempt");
                self.fetch_balance(user).await
            }
            other => other,
        }
    }

    async fn list_withdrawals(&self, user: UserId) -> DbResult<Vec<WithdrawalRecord>> {
        self.policy
            .run("list_withdrawals", || {
                self.attempt("list_withdrawals", self.inner.list_withdrawals(user))
            })
            .await
    }
}

#[async_trait]
impl<S: UserStore> UserStore for Retrying<S> {
    async fn create_user(&self, login: &str, password_hash: &str) -> DbResult<DbUser> {
        let timed_out = AtomicBool::new(false);
        let result = self
            .policy
            .run("create_user", || {
                self.tracked_attempt(
                    "create_user",
                    &timed_out,
                    self.inner.create_user(login, password_hash),
                )
            })
            .await;

        match result {
            Err(DbError::Duplicate(msg)) if timed_out.load(Ordering::Relaxed) => {
                // Salted hashes only match when the row came from this call
                match self.find_user_by_login(login).await? {
                    Some(user) if user.password_hash == password_hash => {
                        info!(login, "User created by a timed-out attempt");
                        Ok(user)
                    }
                    _ => Err(DbError::Duplicate(msg)),
                }
            }
            other => other,
        }
    }

    async fn find_user_by_login(&self, login: &str) -> DbResult<Option<DbUser>> {
        self.policy
            .run("find_user_by_login", || {
                self.attempt("find_user_by_login", self.inner.find_user_by_login(login))
            })
            .await
    }
}
