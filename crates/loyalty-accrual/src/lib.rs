//! Loyalty Reconciliation
//!
//! Background reconciliation of pending orders against the external accrual
//! authority:
//!
//! - [`AccrualClient`]: one bounded-timeout request per order, classified
//!   into an [`AccrualOutcome`]
//! - [`ReconciliationAgent`]: sequential polling cycles on a fixed interval,
//!   paced by throttling signals
//! - [`supervise`]: restart-on-panic wrapper with observable [`AgentHealth`]

pub mod agent;
pub mod client;
pub mod health;
pub mod supervisor;

pub use agent::{CycleReport, ReconciliationAgent, ReconciliationConfig};
pub use client::{
    parse_retry_after, AccrualClient, AccrualConfig, AccrualError, AccrualOutcome,
    AccrualResponse, AccrualSource,
};
pub use health::{AgentHealth, HealthSnapshot};
pub use supervisor::{spawn_supervised, supervise};
