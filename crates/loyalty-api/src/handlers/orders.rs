//! Order upload and listing

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use loyalty_types::{OrderNumber, OrderSubmission};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;

/// Upload a purchase order number as a plain-text body.
///
/// 202 when newly accepted, 200 when this user already uploaded it.
pub async fn submit_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    body: String,
) -> ApiResult<StatusCode> {
    if body.trim().is_empty() {
        return Err(ApiError::MissingOrderNumber);
    }
    let number = OrderNumber::parse(&body)?;

    match state.ledger.create_order(user.user_id, &number).await? {
        OrderSubmission::Accepted => {
            info!(order = %number, user_id = %user.user_id, "Order accepted");
            Ok(StatusCode::ACCEPTED)
        }
        OrderSubmission::AlreadyOwned => Ok(StatusCode::OK),
        OrderSubmission::OwnedByOther => {
            warn!(order = %number, user_id = %user.user_id, "Order belongs to another user");
            Err(ApiError::OrderOwnedByOther)
        }
    }
}

/// Purchase orders of the caller, newest first; 204 when there are none
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Response> {
    let orders = state.ledger.list_orders(user.user_id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(orders).into_response())
}
