//! API integration tests
//!
//! Drive the full router against the in-memory store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use loyalty_accrual::AgentHealth;
use loyalty_api::{create_router, ApiConfig, AppState};
use loyalty_auth::{AuthConfig, PasswordConfig};
use loyalty_db::{LedgerStore, MemoryLedgerStore};
use loyalty_types::{OrderNumber, OrderStatus};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<MemoryLedgerStore>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryLedgerStore::new());
    let mut auth = AuthConfig::default();
    auth.jwt.secret = "test-secret-key-at-least-32-bytes-long!!".to_string();
    auth.password = PasswordConfig {
        memory_cost: 4096,
        time_cost: 1,
        ..PasswordConfig::default()
    };

    let state = AppState::new(
        store.clone(),
        store.clone(),
        &auth,
        Arc::new(AgentHealth::new()),
    )
    .unwrap();

    TestApp {
        router: create_router(Arc::new(state), &ApiConfig::default()),
        store,
    }
}

struct TestResponse {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Value,
}

async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    content_type: &str,
    body: Body,
) -> TestResponse {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let response = app
        .router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    TestResponse {
        status,
        headers,
        body,
    }
}

async fn post_json(app: &TestApp, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
    send(
        app,
        "POST",
        uri,
        token,
        "application/json",
        Body::from(serde_json::to_vec(&body).unwrap()),
    )
    .await
}

async fn post_text(app: &TestApp, uri: &str, token: Option<&str>, body: &str) -> TestResponse {
    send(app, "POST", uri, token, "text/plain", Body::from(body.to_string())).await
}

async fn get(app: &TestApp, uri: &str, token: Option<&str>) -> TestResponse {
    send(app, "GET", uri, token, "application/json", Body::empty()).await
}

/// Register `login` and return its bearer token
async fn register(app: &TestApp, login: &str) -> String {
    let response = post_json(
        app,
        "/api/user/register",
        None,
        json!({"login": login, "password": "correct-horse"}),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    bearer(&response)
}

fn bearer(response: &TestResponse) -> String {
    let value = response
        .headers
        .get(header::AUTHORIZATION)
        .expect("authorization header")
        .to_str()
        .unwrap();
    value.strip_prefix("Bearer ").unwrap().to_string()
}

fn number(s: &str) -> OrderNumber {
    OrderNumber::parse(s).unwrap()
}

// =============================================================================
// Registration and login
// =============================================================================

mod auth {
    use super::*;

    #[tokio::test]
    async fn test_register_issues_token() {
        let app = test_app();
        let response = post_json(
            &app,
            "/api/user/register",
            None,
            json!({"login": "alice", "password": "correct-horse"}),
        )
        .await;

        assert_eq!(response.status, StatusCode::OK);
        assert!(!bearer(&response).is_empty());
        assert_eq!(response.body["message"], "Successful registration");
    }

    #[tokio::test]
    async fn test_register_duplicate_login() {
        let app = test_app();
        register(&app, "alice").await;

        let response = post_json(
            &app,
            "/api/user/register",
            None,
            json!({"login": "alice", "password": "other"}),
        )
        .await;
        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.body["code"], 1300);
    }

    #[tokio::test]
    async fn test_register_malformed_body() {
        let app = test_app();
        let response = send(
            &app,
            "POST",
            "/api/user/register",
            None,
            "application/json",
            Body::from("{not json"),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = post_json(&app, "/api/user/register", None, json!({"login": "bob"})).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = post_json(
            &app,
            "/api/user/register",
            None,
            json!({"login": "", "password": "x"}),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["code"], 1101);
    }

    #[tokio::test]
    async fn test_login() {
        let app = test_app();
        register(&app, "alice").await;

        let ok = post_json(
            &app,
            "/api/user/login",
            None,
            json!({"login": "alice", "password": "correct-horse"}),
        )
        .await;
        assert_eq!(ok.status, StatusCode::OK);
        let token = bearer(&ok);
        assert_eq!(get(&app, "/api/user/balance", Some(&token)).await.status, StatusCode::OK);

        let wrong = post_json(
            &app,
            "/api/user/login",
            None,
            json!({"login": "alice", "password": "battery-staple"}),
        )
        .await;
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

        let unknown = post_json(
            &app,
            "/api/user/login",
            None,
            json!({"login": "nobody", "password": "correct-horse"}),
        )
        .await;
        assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_protected_routes_need_token() {
        let app = test_app();
        for uri in ["/api/user/orders", "/api/user/balance", "/api/user/withdrawals"] {
            assert_eq!(get(&app, uri, None).await.status, StatusCode::UNAUTHORIZED);
            assert_eq!(
                get(&app, uri, Some("not.a.token")).await.status,
                StatusCode::UNAUTHORIZED
            );
        }
        let response = post_text(&app, "/api/user/orders", None, "12345678903").await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }
}

// =============================================================================
// Orders
// =============================================================================

mod orders {
    use super::*;

    #[tokio::test]
    async fn test_submission_statuses() {
        let app = test_app();
        let alice = register(&app, "alice").await;
        let bob = register(&app, "bob").await;

        let uri = "/api/user/orders";
        assert_eq!(post_text(&app, uri, Some(&alice), "12345678903").await.status, StatusCode::ACCEPTED);
        assert_eq!(post_text(&app, uri, Some(&alice), "12345678903").await.status, StatusCode::OK);
        assert_eq!(post_text(&app, uri, Some(&bob), "12345678903").await.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_submission_rejections() {
        let app = test_app();
        let alice = register(&app, "alice").await;
        let uri = "/api/user/orders";

        assert_eq!(post_text(&app, uri, Some(&alice), "").await.status, StatusCode::BAD_REQUEST);
        assert_eq!(post_text(&app, uri, Some(&alice), "  \n").await.status, StatusCode::BAD_REQUEST);

        let bad = post_text(&app, uri, Some(&alice), "12345678904").await;
        assert_eq!(bad.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(bad.body["code"], 1200);

        let letters = post_text(&app, uri, Some(&alice), "12a45").await;
        assert_eq!(letters.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_listing() {
        let app = test_app();
        let alice = register(&app, "alice").await;
        assert_eq!(get(&app, "/api/user/orders", Some(&alice)).await.status, StatusCode::NO_CONTENT);

        post_text(&app, "/api/user/orders", Some(&alice), "12345678903").await;
        post_text(&app, "/api/user/orders", Some(&alice), "79927398713").await;
        app.store
            .apply_decision(&number("12345678903"), OrderStatus::Processed, dec!(729.98))
            .await
            .unwrap();

        let response = get(&app, "/api/user/orders", Some(&alice)).await;
        assert_eq!(response.status, StatusCode::OK);
        let orders = response.body.as_array().unwrap();
        assert_eq!(orders.len(), 2);

        assert_eq!(orders[0]["number"], "79927398713");
        assert_eq!(orders[0]["status"], "NEW");
        assert!(orders[0].get("accrual").is_none());
        assert!(orders[0]["uploaded_at"].is_string());

        assert_eq!(orders[1]["number"], "12345678903");
        assert_eq!(orders[1]["status"], "PROCESSED");
        assert_eq!(orders[1]["accrual"], 729.98);
    }

    /// `79927398713`, gzip-compressed
    const GZIPPED_ORDER: [u8; 31] = [
        0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0x33, 0xb7, 0xb4, 0x34, 0x32,
        0x37, 0xb6, 0xb4, 0x30, 0x37, 0x34, 0x06, 0x00, 0xdf, 0x15, 0x67, 0x95, 0x0b, 0x00, 0x00,
        0x00,
    ];

    #[tokio::test]
    async fn test_gzipped_submission() {
        let app = test_app();
        let alice = register(&app, "alice").await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/user/orders")
            .header(header::CONTENT_TYPE, "text/plain")
            .header(header::CONTENT_ENCODING, "gzip")
            .header(header::AUTHORIZATION, format!("Bearer {}", alice))
            .body(Body::from(GZIPPED_ORDER.to_vec()))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(app.store.status_of(&number("79927398713")), Some(OrderStatus::New));
    }

    #[tokio::test]
    async fn test_listing_is_per_user() {
        let app = test_app();
        let alice = register(&app, "alice").await;
        let bob = register(&app, "bob").await;

        post_text(&app, "/api/user/orders", Some(&alice), "12345678903").await;
        assert_eq!(get(&app, "/api/user/orders", Some(&bob)).await.status, StatusCode::NO_CONTENT);
    }
}

// =============================================================================
// Balance and withdrawals
// =============================================================================

mod balance {
    use super::*;

    /// Register alice with 500 points accrued
    async fn funded(app: &TestApp) -> String {
        let alice = register(app, "alice").await;
        post_text(app, "/api/user/orders", Some(&alice), "12345678903").await;
        app.store
            .apply_decision(&number("12345678903"), OrderStatus::Processed, dec!(500))
            .await
            .unwrap();
        alice
    }

    #[tokio::test]
    async fn test_fresh_balance_is_zero() {
        let app = test_app();
        let alice = register(&app, "alice").await;
        let response = get(&app, "/api/user/balance", Some(&alice)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!({"current": 0.0, "withdrawn": 0.0}));
    }

    #[tokio::test]
    async fn test_withdraw_and_history() {
        let app = test_app();
        let alice = funded(&app).await;

        let response = post_json(
            &app,
            "/api/user/balance/withdraw",
            Some(&alice),
            json!({"order": "2377225624", "sum": 200}),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK);

        let balance = get(&app, "/api/user/balance", Some(&alice)).await;
        assert_eq!(balance.body["current"], 300.0);
        assert_eq!(balance.body["withdrawn"], 200.0);

        let history = get(&app, "/api/user/withdrawals", Some(&alice)).await;
        assert_eq!(history.status, StatusCode::OK);
        let entries = history.body.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["order"], "2377225624");
        assert_eq!(entries[0]["sum"], 200.0);
        assert!(entries[0]["processed_at"].is_string());

        // Withdrawal orders never show up as purchases
        let orders = get(&app, "/api/user/orders", Some(&alice)).await;
        assert_eq!(orders.body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_withdraw_rejections() {
        let app = test_app();
        let alice = funded(&app).await;
        let uri = "/api/user/balance/withdraw";

        let too_much = post_json(&app, uri, Some(&alice), json!({"order": "2377225624", "sum": 500.01})).await;
        assert_eq!(too_much.status, StatusCode::PAYMENT_REQUIRED);

        let bad_number = post_json(&app, uri, Some(&alice), json!({"order": "2377225625", "sum": 10})).await;
        assert_eq!(bad_number.status, StatusCode::UNPROCESSABLE_ENTITY);

        let zero = post_json(&app, uri, Some(&alice), json!({"order": "2377225624", "sum": 0})).await;
        assert_eq!(zero.status, StatusCode::UNPROCESSABLE_ENTITY);

        let negative = post_json(&app, uri, Some(&alice), json!({"order": "2377225624", "sum": -5})).await;
        assert_eq!(negative.status, StatusCode::UNPROCESSABLE_ENTITY);

        let taken = post_json(&app, uri, Some(&alice), json!({"order": "12345678903", "sum": 10})).await;
        assert_eq!(taken.status, StatusCode::CONFLICT);

        let missing = post_json(&app, uri, Some(&alice), json!({"order": "2377225624"})).await;
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);

        let balance = get(&app, "/api/user/balance", Some(&alice)).await;
        assert_eq!(balance.body["current"], 500.0);
    }

    #[tokio::test]
    async fn test_empty_history() {
        let app = test_app();
        let alice = register(&app, "alice").await;
        assert_eq!(
            get(&app, "/api/user/withdrawals", Some(&alice)).await.status,
            StatusCode::NO_CONTENT
        );
    }
}

// =============================================================================
// Health and middleware
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let response = get(&app, "/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "degraded");
    assert_eq!(response.body["reconciliation"]["cycles_completed"], 0);
    assert!(response.body["reconciliation"]["last_successful_cycle"].is_null());
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = test_app();
    let response = get(&app, "/health", None).await;
    assert!(response.headers.contains_key("x-request-id"));
}
