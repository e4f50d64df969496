//! In-memory store implementing the full storage contract
//!
//! Every operation runs under one lock, which also serializes withdrawals.
//! Failures can be injected to exercise callers' retry handling.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_types::{
    Balance, OrderKind, OrderNumber, OrderRecord, OrderStatus, OrderSubmission, PendingOrder,
    UserId, WithdrawalRecord,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{DbError, DbResult, DbUser, DecisionApplied, LedgerStore, UserStore};

#[derive(Debug, Clone)]
struct MemOrder {
    owner: UserId,
    kind: OrderKind,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct LedgerEntry {
    accrual: Decimal,
    withdrawn: Decimal,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, DbUser>,
    orders: HashMap<String, MemOrder>,
    ledger: HashMap<String, LedgerEntry>,
    seq: u64,
    failures: Vec<bool>,
    calls: u64,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn enter(&mut self) -> DbResult<()> {
        self.calls += 1;
        match self.failures.pop() {
            Some(retriable) => Err(DbError::Simulated { retriable }),
            None => Ok(()),
        }
    }

    fn balance(&self, user: UserId) -> Balance {
        let (accrued, withdrawn) = self
            .orders
            .iter()
            .filter(|(_, order)| order.owner == user)
            .filter_map(|(number, order)| self.ledger.get(number).map(|entry| (order, entry)))
            .fold((Decimal::ZERO, Decimal::ZERO), |(accrued, withdrawn), (order, entry)| {
                let accrued = match order.status {
                    OrderStatus::Processed => accrued + entry.accrual,
                    _ => accrued,
                };
                let withdrawn = match order.status {
                    OrderStatus::Invalid => withdrawn,
                    _ => withdrawn + entry.withdrawn,
                };
                (accrued, withdrawn)
            });
        Balance::new(accrued, withdrawn)
    }

    /// Orders of `user` and `kind`, newest first
    fn owned(&self, user: UserId, kind: OrderKind) -> Vec<(&String, &MemOrder)> {
        let mut owned: Vec<_> = self
            .orders
            .iter()
            .filter(|(_, order)| order.owner == user && order.kind == kind)
            .collect();
        owned.sort_by(|a, b| b.1.seq.cmp(&a.1.seq));
        owned
    }
}

/// In-memory [`LedgerStore`] and [`UserStore`]
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls (of any operation) fail
    pub fn fail_next(&self, count: usize, retriable: bool) {
        let mut inner = self.inner.lock();
        inner.failures.extend(std::iter::repeat(retriable).take(count));
    }

    /// Number of operations attempted so far, failed ones included
    pub fn calls(&self) -> u64 {
        self.inner.lock().calls
    }

    /// Current status of any order, purchase or withdrawal
    pub fn status_of(&self, number: &OrderNumber) -> Option<OrderStatus> {
        self.inner.lock().orders.get(number.as_str()).map(|o| o.status)
    }

    /// Ledger accrual of an order, if it has an entry
    pub fn accrual_of(&self, number: &OrderNumber) -> Option<Decimal> {
        self.inner.lock().ledger.get(number.as_str()).map(|e| e.accrual)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn create_order(&self, user: UserId, number: &OrderNumber) -> DbResult<OrderSubmission> {
        let mut inner = self.inner.lock();
        inner.enter()?;

        if let Some(existing) = inner.orders.get(number.as_str()) {
            return Ok(
                if existing.owner == user && existing.kind == OrderKind::Purchase {
                    OrderSubmission::AlreadyOwned
                } else {
                    OrderSubmission::OwnedByOther
                },
            );
        }

        let seq = inner.next_seq();
        inner.orders.insert(
            number.to_string(),
            MemOrder {
                owner: user,
                kind: OrderKind::Purchase,
                status: OrderStatus::New,
                created_at: Utc::now(),
                seq,
            },
        );
        Ok(OrderSubmission::Accepted)
    }

    async fn list_orders(&self, user: UserId) -> DbResult<Vec<OrderRecord>> {
        let mut inner = self.inner.lock();
        inner.enter()?;

        inner
            .owned(user, OrderKind::Purchase)
            .into_iter()
            .map(|(number, order)| -> DbResult<OrderRecord> {
                Ok(OrderRecord {
                    number: OrderNumber::parse(number)?,
                    status: order.status,
                    accrual: match order.status {
                        OrderStatus::Processed => Some(
                            inner
                                .ledger
                                .get(number)
                                .map(|e| e.accrual)
                                .unwrap_or(Decimal::ZERO),
                        ),
                        _ => None,
                    },
                    uploaded_at: order.created_at,
                })
            })
            .collect()
    }

    async fn pending_orders(&self) -> DbResult<Vec<PendingOrder>> {
        let mut inner = self.inner.lock();
        inner.enter()?;

        let mut pending: Vec<_> = inner
            .orders
            .iter()
            .filter(|(_, o)| o.kind == OrderKind::Purchase && !o.status.is_terminal())
            .collect();
        pending.sort_by_key(|(_, o)| o.seq);

        pending
            .into_iter()
            .map(|(number, order)| -> DbResult<PendingOrder> {
                Ok(PendingOrder {
                    number: OrderNumber::parse(number)?,
                    status: order.status,
                })
            })
            .collect()
    }

    async fn apply_decision(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> DbResult<DecisionApplied> {
        let mut inner = self.inner.lock();
        inner.enter()?;

        let order = inner
            .orders
            .get_mut(number.as_str())
            .ok_or_else(|| DbError::NotFound(format!("Order {}", number)))?;

        let current = order.status;
        if !current.accepts(status) {
            return Err(DbError::InvalidTransition {
                order: number.to_string(),
                from: current,
                to: status,
            });
        }
        order.status = status;

        inner.ledger.entry(number.to_string()).or_default().accrual = accrual;

        Ok(if current == status {
            DecisionApplied::Reapplied(status)
        } else {
            DecisionApplied::Transitioned { from: current, to: status }
        })
    }

    async fn fetch_balance(&self, user: UserId) -> DbResult<Balance> {
        let mut inner = self.inner.lock();
        inner.enter()?;
        Ok(inner.balance(user))
    }

    async fn register_withdraw(
        &self,
        user: UserId,
        number: &OrderNumber,
        sum: Decimal,
    ) -> DbResult<Balance> {
        if sum <= Decimal::ZERO {
            return Err(DbError::InvalidInput("Withdrawal sum must be positive".to_string()));
        }

        let mut inner = self.inner.lock();
        inner.enter()?;

        let balance = inner.balance(user);
        if !balance.covers(sum) {
            return Err(DbError::InsufficientBalance(format!(
                "requested {}, available {}",
                sum, balance.current
            )));
        }
        if inner.orders.contains_key(number.as_str()) {
            return Err(DbError::Duplicate(format!("Order {} already exists", number)));
        }

        let seq = inner.next_seq();
        inner.orders.insert(
            number.to_string(),
            MemOrder {
                owner: user,
                kind: OrderKind::Withdrawal,
                status: OrderStatus::Processed,
                created_at: Utc::now(),
                seq,
            },
        );
        inner.ledger.insert(
            number.to_string(),
            LedgerEntry {
                accrual: Decimal::ZERO,
                withdrawn: sum,
            },
        );

        Ok(inner.balance(user))
    }

    async fn list_withdrawals(&self, user: UserId) -> DbResult<Vec<WithdrawalRecord>> {
        let mut inner = self.inner.lock();
        inner.enter()?;

        inner
            .owned(user, OrderKind::Withdrawal)
            .into_iter()
            .map(|(number, order)| -> DbResult<WithdrawalRecord> {
                Ok(WithdrawalRecord {
                    order: OrderNumber::parse(number)?,
                    sum: inner.ledger.get(number).map(|e| e.withdrawn).unwrap_or_default(),
                    processed_at: order.created_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl UserStore for MemoryLedgerStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> DbResult<DbUser> {
        let mut inner = self.inner.lock();
        inner.enter()?;

        if inner.users.contains_key(login) {
            return Err(DbError::Duplicate(format!("Login {} already exists", login)));
        }
        let user = DbUser {
            id: Uuid::new_v4(),
            login: login.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        inner.users.insert(login.to_string(), user.clone());
        Ok(user)
    }

    async fn find_user_by_login(&self, login: &str) -> DbResult<Option<DbUser>> {
        let mut inner = self.inner.lock();
        inner.enter()?;
        Ok(inner.users.get(login).cloned())
    }
}
