//! HTTP client for the external accrual authority
//!
//! `GET {base}/api/orders/{number}` answers:
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 200 | JSON `{order, status, accrual?}` |
//! | 204 | authority has no record of the order yet |
//! | 429 | throttled, `Retry-After` in seconds |
//! | 500 | authority-side failure |
//!
//! Anything else is a malformed response.

use std::time::Duration;

use async_trait::async_trait;
use loyalty_types::{OrderNumber, OrderStatus};
use reqwest::{header, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Client construction errors
#[derive(Debug, Error)]
pub enum AccrualError {
    #[error("Invalid authority base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Accrual authority settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccrualConfig {
    pub base_url: String,
    /// Bound for one request, connect included
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            timeout_ms: 30_000,
            user_agent: format!("loyalty/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// What the authority said about one order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// Interim or final decision. `accrual` is zero unless `PROCESSED`.
    Decided { status: OrderStatus, accrual: Decimal },
    /// No record yet; ask again next cycle
    NotFound,
    /// Slow down. `None` when no usable `Retry-After` was sent.
    Throttled { retry_after: Option<Duration> },
    /// Network error, timeout or 5xx
    TransientFailure(String),
    /// Unexpected status code or body
    MalformedResponse(String),
}

impl AccrualOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Decided { .. } => "decided",
            Self::NotFound => "not_found",
            Self::Throttled { .. } => "throttled",
            Self::TransientFailure(_) => "transient",
            Self::MalformedResponse(_) => "malformed",
        }
    }
}

/// Source of settlement decisions
#[async_trait]
pub trait AccrualSource: Send + Sync {
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome;
}

/// Body of a 200 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub accrual: Option<Decimal>,
}

impl AccrualResponse {
    /// Map the authority's vocabulary onto ours
    pub fn interpret(self, requested: &OrderNumber) -> AccrualOutcome {
        if self.order != requested.as_str() {
            return AccrualOutcome::MalformedResponse(format!(
                "response for order {:?}, requested {}",
                self.order, requested
            ));
        }

        let status = match self.status.as_str() {
            "REGISTERED" | "PROCESSING" => OrderStatus::Processing,
            "PROCESSED" => OrderStatus::Processed,
            "INVALID" => OrderStatus::Invalid,
            other => {
                return AccrualOutcome::MalformedResponse(format!("unknown status {:?}", other))
            }
        };

        let accrual = match status {
            OrderStatus::Processed => self.accrual.unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        };
        if accrual < Decimal::ZERO {
            return AccrualOutcome::MalformedResponse(format!("negative accrual {}", accrual));
        }

        AccrualOutcome::Decided {
            status,
            accrual: accrual.round_dp(2),
        }
    }
}

/// `Retry-After` as delay-seconds. HTTP-date values are not honoured.
pub fn parse_retry_after(value: Option<&header::HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// reqwest-backed [`AccrualSource`]
#[derive(Clone)]
pub struct AccrualClient {
    base_url: String,
    client: reqwest::Client,
}

impl AccrualClient {
    pub fn new(config: &AccrualConfig) -> Result<Self, AccrualError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AccrualError::InvalidBaseUrl(config.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { base_url, client })
    }

    async fn request(&self, number: &OrderNumber) -> AccrualOutcome {
        let url = format!("{}/api/orders/{}", self.base_url, number);
        debug!(%url, "Requesting accrual authority");

        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => return AccrualOutcome::TransientFailure(e.to_string()),
        };

        match resp.status() {
            StatusCode::OK => match resp.json::<AccrualResponse>().await {
                Ok(body) => body.interpret(number),
                Err(e) if e.is_timeout() => AccrualOutcome::TransientFailure(e.to_string()),
                Err(e) => AccrualOutcome::MalformedResponse(format!("undecodable body: {}", e)),
            },
            StatusCode::NO_CONTENT => AccrualOutcome::NotFound,
            StatusCode::TOO_MANY_REQUESTS => AccrualOutcome::Throttled {
                retry_after: parse_retry_after(resp.headers().get(header::RETRY_AFTER)),
            },
            s if s.is_server_error() => {
                AccrualOutcome::TransientFailure(format!("authority returned {}", s.as_u16()))
            }
            other => AccrualOutcome::MalformedResponse(format!("unexpected status {}", other)),
        }
    }
}

#[async_trait]
impl AccrualSource for AccrualClient {
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome {
        let outcome = self.request(number).await;
        metrics::counter!("loyalty_accrual_requests_total", "outcome" => outcome.label())
            .increment(1);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode as AxumStatus;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use rust_decimal_macros::dec;
    use std::net::SocketAddr;

    fn number(s: &str) -> OrderNumber {
        OrderNumber::parse(s).unwrap()
    }

    async fn authority(Path(order): Path<String>) -> Response {
        let body = |status: &str, accrual: Option<f64>| {
            let mut value = serde_json::json!({ "order": order, "status": status });
            if let Some(accrual) = accrual {
                value["accrual"] = serde_json::json!(accrual);
            }
            Json(value).into_response()
        };

        match order.as_str() {
            "79927398713" => body("PROCESSED", Some(500.0)),
            "2377225624" => AxumStatus::NO_CONTENT.into_response(),
            "4561261212345467" => {
                (AxumStatus::TOO_MANY_REQUESTS, [("Retry-After", "30")], "slow down").into_response()
            }
            "26" => AxumStatus::TOO_MANY_REQUESTS.into_response(),
            "0" => AxumStatus::INTERNAL_SERVER_ERROR.into_response(),
            "18" => AxumStatus::IM_A_TEAPOT.into_response(),
            "109" => AxumStatus::BAD_GATEWAY.into_response(),
            "117" => AxumStatus::SERVICE_UNAVAILABLE.into_response(),
            "125" => AxumStatus::GATEWAY_TIMEOUT.into_response(),
            "34" => body("REGISTERED", None),
            "42" => Json(serde_json::json!({ "order": "34", "status": "PROCESSED" })).into_response(),
            "59" => (AxumStatus::OK, "not json").into_response(),
            "67" => body("PROCESSED", None),
            "75" => body("UNKNOWN", None),
            "83" => body("INVALID", None),
            "91" => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                body("PROCESSED", Some(1.0))
            }
            _ => AxumStatus::NOT_FOUND.into_response(),
        }
    }

    async fn spawn_authority() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/api/orders/:number", get(authority));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client(addr: SocketAddr) -> AccrualClient {
        AccrualClient::new(&AccrualConfig {
            base_url: format!("http://{}/", addr),
            timeout_ms: 500,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_status_code_mapping() {
        let client = client(spawn_authority().await);

        assert_eq!(
            client.fetch(&number("79927398713")).await,
            AccrualOutcome::Decided {
                status: OrderStatus::Processed,
                accrual: dec!(500)
            }
        );
        assert_eq!(client.fetch(&number("2377225624")).await, AccrualOutcome::NotFound);
        assert_eq!(
            client.fetch(&number("4561261212345467")).await,
            AccrualOutcome::Throttled {
                retry_after: Some(Duration::from_secs(30))
            }
        );
        assert_eq!(
            client.fetch(&number("26")).await,
            AccrualOutcome::Throttled { retry_after: None }
        );
        assert!(matches!(
            client.fetch(&number("0")).await,
            AccrualOutcome::TransientFailure(_)
        ));
        assert!(matches!(
            client.fetch(&number("18")).await,
            AccrualOutcome::MalformedResponse(_)
        ));
    }

    #[tokio::test]
    async fn test_body_interpretation() {
        let client = client(spawn_authority().await);

        assert_eq!(
            client.fetch(&number("34")).await,
            AccrualOutcome::Decided {
                status: OrderStatus::Processing,
                accrual: Decimal::ZERO
            }
        );
        assert_eq!(
            client.fetch(&number("67")).await,
            AccrualOutcome::Decided {
                status: OrderStatus::Processed,
                accrual: Decimal::ZERO
            }
        );
        assert_eq!(
            client.fetch(&number("83")).await,
            AccrualOutcome::Decided {
                status: OrderStatus::Invalid,
                accrual: Decimal::ZERO
            }
        );
        for malformed in ["42", "59", "75"] {
            assert!(
                matches!(
                    client.fetch(&number(malformed)).await,
                    AccrualOutcome::MalformedResponse(_)
                ),
                "order {} should be malformed",
                malformed
            );
        }
    }

    #[tokio::test]
    async fn test_any_server_error_is_transient() {
        let client = client(spawn_authority().await);
        for order in ["109", "117", "125"] {
            match client.fetch(&number(order)).await {
                AccrualOutcome::TransientFailure(msg) => {
                    assert!(msg.starts_with("authority returned 5"), "{}", msg)
                }
                other => panic!("order {} gave {:?}", order, other),
            }
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let client = client(spawn_authority().await);
        assert!(matches!(
            client.fetch(&number("91")).await,
            AccrualOutcome::TransientFailure(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_authority_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(matches!(
            client(addr).fetch(&number("79927398713")).await,
            AccrualOutcome::TransientFailure(_)
        ));
    }

    #[test]
    fn test_invalid_base_url() {
        let err = AccrualClient::new(&AccrualConfig {
            base_url: "localhost:8081".into(),
            ..Default::default()
        });
        assert!(matches!(err, Err(AccrualError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_parse_retry_after() {
        let v = header::HeaderValue::from_static(" 30 ");
        assert_eq!(parse_retry_after(Some(&v)), Some(Duration::from_secs(30)));
        let v = header::HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(Some(&v)), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_negative_accrual_is_malformed() {
        let body = AccrualResponse {
            order: "79927398713".into(),
            status: "PROCESSED".into(),
            accrual: Some(dec!(-1)),
        };
        assert!(matches!(
            body.interpret(&number("79927398713")),
            AccrualOutcome::MalformedResponse(_)
        ));
    }
}
