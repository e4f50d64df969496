//! Restart-on-panic supervision for the reconciliation agent

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::ReconciliationAgent;

/// Run `agent` until `shutdown` is cancelled, restarting it after a panic.
///
/// Each restart is counted in the agent's health and preceded by the
/// configured restart delay.
pub async fn supervise(agent: Arc<ReconciliationAgent>, shutdown: CancellationToken) {
    let health = agent.health();
    let restart_delay = agent.config().restart_delay();

    loop {
        health.set_running(true);
        let result = AssertUnwindSafe(agent.run(shutdown.clone()))
            .catch_unwind()
            .await;
        health.set_running(false);

        match result {
            Ok(()) if shutdown.is_cancelled() => {
                info!("Reconciliation supervisor stopped");
                return;
            }
            Ok(()) => warn!("Reconciliation agent returned unexpectedly, restarting"),
            Err(panic) => {
                health.record_restart();
                error!(
                    panic = %panic_message(&*panic),
                    restart_delay_ms = restart_delay.as_millis() as u64,
                    "Reconciliation agent panicked, restarting"
                );
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(restart_delay) => {}
        }
    }
}

/// Spawn [`supervise`] on the runtime
pub fn spawn_supervised(
    agent: Arc<ReconciliationAgent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(supervise(agent, shutdown))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::{decided, numbers};
    use crate::agent::ReconciliationConfig;
    use crate::client::{AccrualOutcome, AccrualSource};
    use crate::health::AgentHealth;
    use async_trait::async_trait;
    use loyalty_db::{LedgerStore, MemoryLedgerStore};
    use loyalty_types::{OrderNumber, OrderStatus};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Panics on the first `panics` calls, then decides PROCESSED
    struct PanickingSource {
        panics: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AccrualSource for PanickingSource {
        async fn fetch(&self, _number: &OrderNumber) -> AccrualOutcome {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.panics {
                panic!("authority client blew up");
            }
            decided(OrderStatus::Processed, dec!(100))
        }
    }

    fn supervised_agent(
        store: Arc<MemoryLedgerStore>,
        panics: u32,
    ) -> Arc<ReconciliationAgent> {
        Arc::new(ReconciliationAgent::new(
            store,
            Arc::new(PanickingSource {
                panics,
                calls: AtomicU32::new(0),
            }),
            ReconciliationConfig::default(),
            Arc::new(AgentHealth::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_panic() {
        let store = Arc::new(MemoryLedgerStore::new());
        let n = &numbers()[0];
        store.create_order(uuid::Uuid::new_v4(), n).await.unwrap();

        let agent = supervised_agent(store.clone(), 2);
        let shutdown = CancellationToken::new();
        let handle = spawn_supervised(agent.clone(), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(3)).await;
        let health = agent.health().snapshot();
        assert_eq!(health.restarts, 2);
        assert!(health.running);
        assert_eq!(store.status_of(n), Some(OrderStatus::Processed));

        shutdown.cancel();
        handle.await.unwrap();
        assert!(!agent.health().snapshot().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_stop_ends_supervision() {
        let store = Arc::new(MemoryLedgerStore::new());
        let agent = supervised_agent(store, 0);
        let shutdown = CancellationToken::new();
        let handle = spawn_supervised(agent.clone(), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let health = agent.health().snapshot();
        assert_eq!(health.restarts, 0);
        assert_eq!(health.cycles_completed, 1);
        assert!(!health.running);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*boxed), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
