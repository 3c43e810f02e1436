//! Boundary error taxonomy for session operations.
//!
//! Every variant carries the one message a client is allowed to see. Internal
//! causes are logged where they are wrapped and never rendered.

use std::fmt::Display;
use thiserror::Error;
use tracing::error;

pub(crate) const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub(crate) const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// The single login failure: unknown email and wrong password look alike.
    #[must_use]
    pub fn invalid_credentials() -> Self {
        Self::Unauthorized(INVALID_CREDENTIALS.to_string())
    }

    /// The single refresh failure: unknown, replayed and expired look alike.
    #[must_use]
    pub fn invalid_refresh_token() -> Self {
        Self::Unauthorized(INVALID_REFRESH_TOKEN.to_string())
    }

    /// Log `cause` and return an `Internal` error carrying only `message`.
    pub fn internal(message: &'static str, cause: impl Display) -> Self {
        error!("{message}: {cause:#}");
        Self::Internal(message.to_string())
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(message)
            | Self::Unauthorized(message)
            | Self::Conflict(message)
            | Self::NotFound(message)
            | Self::Internal(message) => message,
        }
    }
}
