//! Loyalty REST API
//!
//! ```text
//! /api/user/
//! ├── POST /register          - create account, returns bearer token
//! ├── POST /login             - returns bearer token
//! ├── POST /orders            - upload purchase order number (text/plain)
//! ├── GET  /orders            - uploaded orders with status and accrual
//! ├── GET  /balance           - current and withdrawn points
//! ├── POST /balance/withdraw  - redeem points against a new order number
//! └── GET  /withdrawals       - redemption history
//! /health                     - liveness and reconciliation health
//! ```
//!
//! Everything under `/api/user` except `register` and `login` requires
//! `Authorization: Bearer <jwt>`.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, http::HeaderName, routing::get, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    decompression::RequestDecompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};
pub use extractors::AuthenticatedUser;
pub use state::AppState;

/// HTTP layer options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enable_cors: bool,
    /// `*` allows any origin
    pub cors_origins: Vec<String>,
    pub enable_compression: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: false,
            cors_origins: vec!["*".to_string()],
            enable_compression: true,
            max_body_size: 64 * 1024,
        }
    }
}

/// Build the router with request ids, tracing, compression and CORS
pub fn create_router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let mut router = Router::new()
        .nest("/api/user", routes::user_routes())
        .route("/health", get(handlers::health::health_check))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .with_state(state);

    // gzip in both directions: compressed uploads and compressed replies
    if config.enable_compression {
        router = router
            .layer(RequestDecompressionLayer::new())
            .layer(CompressionLayer::new());
    }

    if config.enable_cors {
        router = router.layer(cors_layer(&config.cors_origins));
    }

    // Outermost: the id must exist before the trace span is opened
    let x_request_id = HeaderName::from_static("x-request-id");
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");

                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(
            origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect::<Vec<_>>(),
        )
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any)
        .expose_headers([axum::http::header::AUTHORIZATION])
}
