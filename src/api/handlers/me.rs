//! The authenticated account: read, update and delete.

use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{require_payload, MessageBody};
use crate::{
    accounts::AccountProfile,
    api::{error::ErrorBody, gate::Principal},
    session::{AuthError, SessionManager},
};

#[derive(ToSchema, Deserialize)]
pub struct UpdateProfileRequest {
    name: String,
    password: String,
}

#[utoipa::path(
    get,
    path = "/v1/users/me",
    responses(
        (status = 200, description = "Profile of the authenticated account", body = AccountProfile),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 404, description = "Account no longer exists", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn me(
    sessions: Extension<Arc<SessionManager>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AuthError> {
    let profile = sessions.profile(principal.subject).await?;
    Ok(Json(profile))
}

/// Changing the password revokes the refresh token.
#[utoipa::path(
    put,
    path = "/v1/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = AccountProfile),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 404, description = "Account no longer exists", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update(
    sessions: Extension<Arc<SessionManager>>,
    Extension(principal): Extension<Principal>,
    payload: Option<Json<UpdateProfileRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let request = require_payload(payload)?;
    let profile = sessions
        .update_profile(principal.subject, &request.name, &request.password)
        .await?;
    Ok(Json(profile))
}

#[utoipa::path(
    delete,
    path = "/v1/users/me",
    responses(
        (status = 200, description = "Account and session removed", body = MessageBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 404, description = "Account no longer exists", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete(
    sessions: Extension<Arc<SessionManager>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AuthError> {
    sessions.delete_account(principal.subject).await?;
    Ok(Json(MessageBody {
        message: "User deleted".to_string(),
    }))
}
