//! Liveness plus reconciliation agent health

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::dto::HealthResponse;
use crate::state::AppState;

/// Always 200; `status` is `degraded` while the agent is not running
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let reconciliation = state.agent.snapshot();
    Json(HealthResponse {
        status: if reconciliation.running {
            "healthy"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        reconciliation,
    })
}
