//! Request gate for routes that need an access credential.
//!
//! Flow Overview: read `Authorization: Bearer <token>`, verify it with the
//! session manager, and attach the resulting [`Principal`] to the request.
//! Any failure answers 401 and the handler never runs.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::session::{AuthError, SessionManager};

const MISSING_HEADER: &str = "Missing authorization header";
const INVALID_HEADER: &str = "Invalid authorization header";

/// Authenticated subject of the current request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal {
    pub subject: Uuid,
}

/// Return the bearer token from `Authorization`. The scheme is matched
/// case-insensitively.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AuthError::unauthorized(MISSING_HEADER))?
        .to_str()
        .map_err(|_| AuthError::unauthorized(INVALID_HEADER))?
        .trim();

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AuthError::unauthorized(INVALID_HEADER))?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::unauthorized(INVALID_HEADER));
    }

    Ok(token)
}

pub async fn require_bearer(
    State(sessions): State<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    let subject = match extract_bearer_token(request.headers())
        .and_then(|token| sessions.authenticate(token))
    {
        Ok(subject) => subject,
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(Principal { subject });

    next.run(request).await
}
