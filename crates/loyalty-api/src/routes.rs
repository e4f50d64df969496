//! Route definitions

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// Everything under `/api/user`
pub fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route(
            "/orders",
            post(handlers::orders::submit_order).get(handlers::orders::list_orders),
        )
        .route("/balance", get(handlers::balance::get_balance))
        .route("/balance/withdraw", post(handlers::balance::withdraw))
        .route("/withdrawals", get(handlers::balance::list_withdrawals))
}
