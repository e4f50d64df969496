//! Registration and login
//!
//! Both answer 200 with the token in the `Authorization` response header.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use loyalty_db::DbError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dto::{CredentialsRequest, MessageResponse};
use crate::error::{ApiError, ApiResult};
use crate::extractors::ValidatedJson;
use crate::state::AppState;

pub async fn register(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CredentialsRequest>,
) -> ApiResult<Response> {
    let hash = state.passwords.hash_password(&request.password)?;

    let user = match state.users.create_user(&request.login, &hash).await {
        Ok(user) => user,
        Err(DbError::Duplicate(_)) => {
            warn!(login = %request.login, "Login already taken");
            return Err(ApiError::LoginTaken);
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, login = %user.login, "User registered");
    token_response(&state, user.id, &user.login, "Successful registration")
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CredentialsRequest>,
) -> ApiResult<Response> {
    let user = state
        .users
        .find_user_by_login(&request.login)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !state
        .passwords
        .verify_password(&request.password, &user.password_hash)?
    {
        warn!(login = %request.login, "Wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    info!(user_id = %user.id, "User logged in");
    token_response(&state, user.id, &user.login, "Successful login")
}

fn token_response(
    state: &AppState,
    user_id: Uuid,
    login: &str,
    message: &str,
) -> ApiResult<Response> {
    let token = state.jwt.issue(user_id, login)?;
    let header = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ApiError::Internal)?;

    let mut response = Json(MessageResponse::new(message)).into_response();
    response.headers_mut().insert(AUTHORIZATION, header);
    Ok(response)
}
