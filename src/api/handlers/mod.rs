pub mod auth;
pub mod health;
pub mod me;

use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::session::AuthError;

const INVALID_REQUEST: &str = "Invalid request format";

/// Plain acknowledgement body.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    pub message: String,
}

/// Unwrap an optional JSON payload; a missing or malformed body is a `BadRequest`.
fn require_payload<T>(payload: Option<Json<T>>) -> Result<T, AuthError> {
    payload
        .map(|Json(payload)| payload)
        .ok_or_else(|| AuthError::bad_request(INVALID_REQUEST))
}
