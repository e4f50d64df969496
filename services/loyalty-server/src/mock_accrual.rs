//! In-process stand-in for the accrual authority, for local runs
//!
//! Every lookup answers with a random decision: `REGISTERED`, `PROCESSING`,
//! `INVALID`, or `PROCESSED` with an accrual between 1.00 and 999.99.

use axum::{extract::Path, routing::get, Json, Router};
use loyalty_accrual::AccrualResponse;
use rand::Rng;
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Serve on an ephemeral local port; returns its base URL
pub async fn spawn(shutdown: CancellationToken) -> anyhow::Result<(String, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let app = Router::new().route("/api/orders/:number", get(order_status));

    info!(base_url = %base_url, "Mock accrual authority listening");
    let handle = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            error!(error = %e, "Mock accrual authority failed");
        }
    });
    Ok((base_url, handle))
}

async fn order_status(Path(number): Path<String>) -> Json<AccrualResponse> {
    let response = decide(number, &mut rand::thread_rng());
    debug!(order = %response.order, status = %response.status, "Mock decision");
    Json(response)
}

fn decide(order: String, rng: &mut impl Rng) -> AccrualResponse {
    let (status, accrual) = match rng.gen_range(0..4) {
        0 => ("REGISTERED", None),
        1 => ("PROCESSING", None),
        2 => ("INVALID", None),
        _ => ("PROCESSED", Some(Decimal::new(rng.gen_range(100..100_000), 2))),
    };
    AccrualResponse {
        order,
        status: status.to_string(),
        accrual,
    }
}
