use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `/balance/withdraw`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WithdrawRequest {
    /// Fresh order number the redemption is recorded under
    #[validate(length(min = 1, message = "must not be empty"))]
    pub order: String,
    pub sum: Decimal,
}

/// Body of `/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub reconciliation: loyalty_accrual::HealthSnapshot,
}
