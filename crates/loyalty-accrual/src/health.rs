//! Observable health of the reconciliation agent

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Shared counters, updated by the agent and its supervisor
#[derive(Debug, Default)]
pub struct AgentHealth {
    /// Unix millis of the last completed cycle, 0 when none yet
    last_success_ms: AtomicI64,
    cycles_completed: AtomicU64,
    cycle_failures: AtomicU64,
    restarts: AtomicU64,
    running: AtomicBool,
}

/// Point-in-time view for `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub last_successful_cycle: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub cycle_failures: u64,
    pub restarts: u64,
    pub running: bool,
}

impl AgentHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self) {
        let now = Utc::now();
        self.last_success_ms.store(now.timestamp_millis(), Ordering::Relaxed);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);

        metrics::counter!("loyalty_reconciliation_cycles_total").increment(1);
        metrics::gauge!("loyalty_reconciliation_last_success_timestamp_seconds")
            .set(now.timestamp() as f64);
    }

    /// Cycle could not even list pending orders
    pub fn record_cycle_failure(&self) {
        self.cycle_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("loyalty_reconciliation_cycle_failures_total").increment(1);
    }

    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("loyalty_reconciliation_restarts_total").increment(1);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
        metrics::gauge!("loyalty_reconciliation_running").set(if running { 1.0 } else { 0.0 });
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last = self.last_success_ms.load(Ordering::Relaxed);
        HealthSnapshot {
            last_successful_cycle: match last {
                0 => None,
                ms => Utc.timestamp_millis_opt(ms).single(),
            },
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycle_failures: self.cycle_failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
        }
    }
}
