//! Balance, withdrawals and their history

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use loyalty_types::{ensure_positive, Balance, OrderNumber};
use tracing::info;

use crate::dto::WithdrawRequest;
use crate::error::ApiResult;
use crate::extractors::{AuthenticatedUser, ValidatedJson};
use crate::state::AppState;

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Balance>> {
    Ok(Json(state.ledger.fetch_balance(user.user_id).await?))
}

/// Redeem points against a fresh order number.
///
/// 402 when the balance does not cover the sum, 409 when the number is taken.
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    ValidatedJson(request): ValidatedJson<WithdrawRequest>,
) -> ApiResult<Json<Balance>> {
    let number = OrderNumber::parse(&request.order)?;
    let sum = ensure_positive(request.sum)?;

    let balance = state
        .ledger
        .register_withdraw(user.user_id, &number, sum)
        .await?;

    info!(
        order = %number,
        user_id = %user.user_id,
        sum = %sum,
        current = %balance.current,
        "Withdrawal registered"
    );
    Ok(Json(balance))
}

/// Withdrawals of the caller, newest first; 204 when there are none
pub async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Response> {
    let withdrawals = state.ledger.list_withdrawals(user.user_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(withdrawals).into_response())
}
