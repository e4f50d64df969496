//! Reconciliation agent
//!
//! One cycle: list pending orders, then for each order in turn ask the
//! authority and apply a decision through the ledger store. A throttled
//! answer ends the cycle early and stretches the following pause to at
//! least the advisory delay.
//!
//! ```text
//! Idle ──► Fetching ──► { Query ──► Apply }* ──► Idle
//!                           │
//!                           └── Throttled: skip rest of cycle
//! ```

use std::sync::Arc;
use std::time::Duration;

use loyalty_db::{DbError, DbResult, DecisionApplied, LedgerStore};
use loyalty_types::PendingOrder;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{AccrualOutcome, AccrualSource};
use crate::health::AgentHealth;

/// Polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub poll_interval_ms: u64,
    /// Pause after a 429 that carried no usable `Retry-After`
    pub default_throttle_secs: u64,
    /// Pause before restarting a panicked agent
    pub restart_delay_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            default_throttle_secs: 60,
            restart_delay_ms: 1000,
        }
    }
}

impl ReconciliationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_throttle(&self) -> Duration {
        Duration::from_secs(self.default_throttle_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Tally of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pending: usize,
    /// Orders the authority was asked about
    pub queried: usize,
    /// Decisions that moved an order forward
    pub applied: usize,
    /// Decisions equal to the stored status
    pub reapplied: usize,
    /// Not found, transient or malformed; retried next cycle
    pub deferred: usize,
    /// Storage rejected or failed the update
    pub failed: usize,
    /// Set when the cycle stopped on a throttle
    pub throttled: Option<Duration>,
}

pub struct ReconciliationAgent {
    store: Arc<dyn LedgerStore>,
    source: Arc<dyn AccrualSource>,
    config: ReconciliationConfig,
    health: Arc<AgentHealth>,
}

impl ReconciliationAgent {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        source: Arc<dyn AccrualSource>,
        config: ReconciliationConfig,
        health: Arc<AgentHealth>,
    ) -> Self {
        Self {
            store,
            source,
            config,
            health,
        }
    }

    pub fn health(&self) -> Arc<AgentHealth> {
        self.health.clone()
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between cycles and during the pause, never
    /// in the middle of a cycle.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.config.poll_interval_ms,
            "Reconciliation agent started"
        );

        while !shutdown.is_cancelled() {
            let pause = match self.run_cycle().await {
                Ok(report) => {
                    self.health.record_cycle();
                    debug!(
                        pending = report.pending,
                        queried = report.queried,
                        applied = report.applied,
                        reapplied = report.reapplied,
                        deferred = report.deferred,
                        failed = report.failed,
                        "Reconciliation cycle complete"
                    );
                    self.pause_after(&report)
                }
                Err(e) => {
                    self.health.record_cycle_failure();
                    error!(error = %e, "Failed to list pending orders");
                    self.config.poll_interval()
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Reconciliation agent stopped");
    }

    fn pause_after(&self, report: &CycleReport) -> Duration {
        let interval = self.config.poll_interval();
        match report.throttled {
            Some(advisory) => advisory.max(interval),
            None => interval,
        }
    }

    /// One pass over every pending order.
    ///
    /// Only a failure to list pending orders fails the cycle; per-order
    /// failures are counted and the pass moves on.
    pub async fn run_cycle(&self) -> DbResult<CycleReport> {
        let pending = self.store.pending_orders().await?;
        let mut report = CycleReport {
            pending: pending.len(),
            ..Default::default()
        };

        for order in &pending {
            report.queried += 1;
            match self.source.fetch(&order.number).await {
                AccrualOutcome::Decided { status, accrual } => {
                    self.apply(order, status, accrual, &mut report).await;
                }
                AccrualOutcome::Throttled { retry_after } => {
                    let delay = retry_after.unwrap_or_else(|| self.config.default_throttle());
                    warn!(
                        order = %order.number,
                        retry_after_secs = delay.as_secs(),
                        skipped = pending.len() - report.queried,
                        "Accrual authority throttled, ending cycle"
                    );
                    metrics::counter!("loyalty_accrual_throttled_total").increment(1);
                    report.throttled = Some(delay);
                    break;
                }
                AccrualOutcome::NotFound => {
                    debug!(order = %order.number, "Order not registered with authority yet");
                    report.deferred += 1;
                }
                AccrualOutcome::TransientFailure(reason) => {
                    warn!(order = %order.number, %reason, "Accrual authority unavailable");
                    report.deferred += 1;
                }
                AccrualOutcome::MalformedResponse(reason) => {
                    error!(order = %order.number, %reason, "Malformed accrual response");
                    report.deferred += 1;
                }
            }
        }

        Ok(report)
    }

    async fn apply(
        &self,
        order: &PendingOrder,
        status: loyalty_types::OrderStatus,
        accrual: rust_decimal::Decimal,
        report: &mut CycleReport,
    ) {
        match self.store.apply_decision(&order.number, status, accrual).await {
            Ok(DecisionApplied::Transitioned { from, to }) => {
                info!(order = %order.number, %from, %to, %accrual, "Applied accrual decision");
                report.applied += 1;
            }
            Ok(DecisionApplied::Reapplied(status)) => {
                debug!(order = %order.number, %status, "Decision unchanged");
                report.reapplied += 1;
            }
            Err(e @ DbError::InvalidTransition { .. }) => {
                warn!(order = %order.number, error = %e, "Ignoring backward decision");
                report.failed += 1;
            }
            Err(e) => {
                error!(order = %order.number, error = %e, "Failed to apply accrual decision");
                report.failed += 1;
            }
        }
    }
}
