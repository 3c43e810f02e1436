//! Register, login, refresh and logout endpoints.

use axum::{
    extract::Extension,
    http::{header::CACHE_CONTROL, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{require_payload, MessageBody};
use crate::{
    accounts::AccountProfile,
    api::{error::ErrorBody, gate::Principal},
    session::{AuthError, SessionManager, TokenPair},
};

#[derive(ToSchema, Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
    name: String,
}

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(ToSchema, Deserialize)]
pub struct RefreshRequest {
    refresh_token: String,
}

// Token pairs must never be cached by intermediaries.
fn token_response(pair: TokenPair) -> impl IntoResponse {
    (
        [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(pair),
    )
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AccountProfile),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    sessions: Extension<Arc<SessionManager>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let request = require_payload(payload)?;
    let profile = sessions
        .register(&request.email, &request.password, &request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session started", body = TokenPair),
        (status = 400, description = "Invalid request format", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    sessions: Extension<Arc<SessionManager>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let request = require_payload(payload)?;
    let pair = sessions.login(&request.email, &request.password).await?;
    Ok(token_response(pair))
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Session rotated", body = TokenPair),
        (status = 400, description = "Invalid request format", body = ErrorBody),
        (status = 401, description = "Invalid refresh token", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    sessions: Extension<Arc<SessionManager>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let request = require_payload(payload)?;
    let pair = sessions.refresh(&request.refresh_token).await?;
    Ok(token_response(pair))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Refresh token revoked", body = MessageBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    sessions: Extension<Arc<SessionManager>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AuthError> {
    sessions.logout(principal.subject).await?;
    Ok(Json(MessageBody {
        message: "Logout successful".to_string(),
    }))
}
