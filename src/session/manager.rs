//! Session manager: register, login, refresh and logout.
//!
//! Flow Overview: login verifies the password and issues a session pair (a
//! signed access credential plus an opaque refresh token stored per subject).
//! Refresh swaps the presented refresh token for a fresh pair in one store
//! step, so every refresh token is single-use. Logout deletes the subject's
//! refresh token, which stops renewal; issued access credentials run out on
//! their own.

use anyhow::Context;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::task;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    clock::{Clock, SystemClock},
    codec::CredentialCodec,
    config::SessionConfig,
    error::AuthError,
    store::{RefreshRecord, RefreshTokenStore, StoreError},
};
use crate::accounts::{
    AccountError, AccountProfile, AccountRepository, NewAccount, PasswordHasher,
};

pub const MIN_PASSWORD_CHARS: usize = 6;

const EMAIL_TAKEN: &str = "Email already registered";
const INVALID_TOKEN: &str = "Invalid token";
// Verified against when the email is unknown so both login failures cost the same.
const DUMMY_PASSWORD: &str = "turnstile-timing-equaliser";

/// Tokens returned by login and refresh.
#[derive(ToSchema, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access credential lifetime in seconds.
    pub expires_in: u64,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

pub struct SessionManager {
    config: SessionConfig,
    codec: CredentialCodec,
    accounts: Arc<dyn AccountRepository>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    passwords: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    dummy_hash: String,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("access_ttl", &self.config.access_ttl())
            .field("refresh_ttl", &self.config.refresh_ttl())
            .field("accounts", &self.accounts)
            .field("refresh_tokens", &self.refresh_tokens)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Hashes the unknown-email placeholder up front so the first failed
    /// login costs the same as every other one.
    ///
    /// # Errors
    /// Returns an error if the password hasher fails.
    pub fn new(
        config: SessionConfig,
        accounts: Arc<dyn AccountRepository>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        passwords: Arc<dyn PasswordHasher>,
    ) -> anyhow::Result<Self> {
        let codec = CredentialCodec::new(config.signing_key().clone());
        let dummy_hash = passwords
            .hash(DUMMY_PASSWORD)
            .context("Failed to prepare login hash")?;
        Ok(Self {
            config,
            codec,
            accounts,
            refresh_tokens,
            passwords,
            clock: Arc::new(SystemClock),
            dummy_hash,
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create an account. Does not log the user in.
    ///
    /// # Errors
    /// `BadRequest` for invalid input, `Conflict` for a taken email,
    /// `Internal` for hashing or storage failures.
    #[instrument(skip_all)]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AccountProfile, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::bad_request("Invalid email address"));
        }
        check_password(password)?;
        let name = check_name(name)?;

        let existing = self
            .accounts
            .find_by_email(&email)
            .await
            .map_err(|err| account_failure("Failed to lookup account", err))?;
        if existing.is_some() {
            return Err(AuthError::Conflict(EMAIL_TAKEN.to_string()));
        }

        let password_hash = self.hash_password(password).await?;

        let account = self
            .accounts
            .save(NewAccount {
                email,
                name: name.to_string(),
                password_hash,
            })
            .await
            .map_err(|err| account_failure("Failed to create account", err))?;

        info!(subject = %account.id, "account registered");

        Ok(account.into())
    }

    /// Authenticate with email and password and start a session.
    ///
    /// # Errors
    /// `Unauthorized` with one generic message for unknown email or wrong
    /// password, `Internal` for hashing, signing or storage failures.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);
        let account = if valid_email(&email) {
            self.accounts
                .find_by_email(&email)
                .await
                .map_err(|err| account_failure("Failed to lookup account", err))?
        } else {
            None
        };

        let Some(account) = account else {
            let _ = self
                .verify_password(self.dummy_hash.clone(), password)
                .await;
            debug!("login rejected: unknown email");
            return Err(AuthError::invalid_credentials());
        };

        if !self
            .verify_password(account.password_hash.clone(), password)
            .await?
        {
            debug!(subject = %account.id, "login rejected: wrong password");
            return Err(AuthError::invalid_credentials());
        }

        let pair = self.issue_session_pair(account.id).await?;

        info!(subject = %account.id, "session started");

        Ok(pair)
    }

    /// Exchange a live refresh token for a new session pair.
    ///
    /// The presented token is consumed in the same store step that saves its
    /// replacement. An expired token is deleted on touch.
    ///
    /// # Errors
    /// `Unauthorized` for unknown, replayed or expired tokens, `Internal` for
    /// signing or storage failures.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::bad_request("Refresh token is required"));
        }

        let now = self.clock.now();

        let Some(record) = self
            .refresh_tokens
            .find_by_token(refresh_token)
            .await
            .map_err(|err| store_failure("Failed to lookup refresh token", err))?
        else {
            debug!("refresh rejected: unknown token");
            return Err(AuthError::invalid_refresh_token());
        };

        if record.is_expired(now) {
            match self.refresh_tokens.delete_by_token(refresh_token).await {
                Ok(()) | Err(StoreError::NotFound) => {}
                Err(err) => return Err(store_failure("Failed to delete refresh token", err)),
            }
            debug!(subject = %record.subject, "refresh rejected: token expired");
            return Err(AuthError::invalid_refresh_token());
        }

        let (pair, next) = self.mint_pair(record.subject, now)?;

        let rotated = self
            .refresh_tokens
            .rotate(refresh_token, next)
            .await
            .map_err(|err| store_failure("Failed to save refresh token", err))?;
        if !rotated {
            warn!(subject = %record.subject, "refresh rejected: token already consumed");
            return Err(AuthError::invalid_refresh_token());
        }

        info!(subject = %record.subject, "session rotated");

        Ok(pair)
    }

    /// End the subject's session. Succeeds when there is none.
    ///
    /// # Errors
    /// `Internal` for storage failures.
    #[instrument(skip(self))]
    pub async fn logout(&self, subject: Uuid) -> Result<(), AuthError> {
        self.refresh_tokens
            .delete_by_subject(subject)
            .await
            .map_err(|err| store_failure("Failed to delete refresh token", err))?;

        info!(subject = %subject, "session revoked");

        Ok(())
    }

    /// Verify an access credential against this manager's clock.
    ///
    /// # Errors
    /// `Unauthorized("Invalid token")` for any rejected credential.
    pub fn authenticate(&self, access_token: &str) -> Result<Uuid, AuthError> {
        self.codec
            .verify_at(access_token, self.clock.now())
            .map_err(|err| {
                debug!("access token rejected: {err}");
                AuthError::unauthorized(INVALID_TOKEN)
            })
    }

    /// # Errors
    /// `NotFound` when the account no longer exists, `Internal` for storage failures.
    #[instrument(skip(self))]
    pub async fn profile(&self, subject: Uuid) -> Result<AccountProfile, AuthError> {
        self.accounts
            .find_by_id(subject)
            .await
            .map_err(|err| account_failure("Failed to lookup account", err))?
            .map(AccountProfile::from)
            .ok_or_else(user_not_found)
    }

    /// Replace the subject's name and password.
    ///
    /// The refresh token is revoked, so other devices have to log in again
    /// with the new password once their access credentials run out.
    ///
    /// # Errors
    /// `BadRequest` for invalid input, `NotFound` when the account no longer
    /// exists, `Internal` for hashing or storage failures.
    #[instrument(skip(self, name, password))]
    pub async fn update_profile(
        &self,
        subject: Uuid,
        name: &str,
        password: &str,
    ) -> Result<AccountProfile, AuthError> {
        check_password(password)?;
        let name = check_name(name)?;

        let password_hash = self.hash_password(password).await?;

        let account = self
            .accounts
            .update(subject, name, &password_hash)
            .await
            .map_err(|err| account_failure("Failed to update account", err))?
            .ok_or_else(user_not_found)?;

        self.refresh_tokens
            .delete_by_subject(subject)
            .await
            .map_err(|err| store_failure("Failed to delete refresh token", err))?;

        info!(subject = %subject, "account updated, session revoked");

        Ok(account.into())
    }

    /// Delete the subject's account together with its refresh token.
    ///
    /// # Errors
    /// `NotFound` when the account no longer exists, `Internal` for storage failures.
    #[instrument(skip(self))]
    pub async fn delete_account(&self, subject: Uuid) -> Result<(), AuthError> {
        self.refresh_tokens
            .delete_by_subject(subject)
            .await
            .map_err(|err| store_failure("Failed to delete refresh token", err))?;

        let deleted = self
            .accounts
            .delete(subject)
            .await
            .map_err(|err| account_failure("Failed to delete account", err))?;
        if !deleted {
            return Err(user_not_found());
        }

        info!(subject = %subject, "account deleted");

        Ok(())
    }

    /// Reclaim expired refresh records. Storage housekeeping only.
    ///
    /// # Errors
    /// `Internal` for storage failures.
    pub async fn sweep_expired(&self) -> Result<u64, AuthError> {
        self.refresh_tokens
            .purge_expired(self.clock.now())
            .await
            .map_err(|err| store_failure("Failed to purge expired refresh tokens", err))
    }

    async fn issue_session_pair(&self, subject: Uuid) -> Result<TokenPair, AuthError> {
        let (pair, record) = self.mint_pair(subject, self.clock.now())?;

        self.refresh_tokens
            .put(record)
            .await
            .map_err(|err| store_failure("Failed to save refresh token", err))?;

        Ok(pair)
    }

    /// Build a pair and its refresh record without touching storage.
    fn mint_pair(
        &self,
        subject: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(TokenPair, RefreshRecord), AuthError> {
        let access_token = self
            .codec
            .issue_at(subject, self.config.access_ttl(), now)
            .map_err(|err| AuthError::internal("Failed to generate access token", err))?;

        let refresh_token = self
            .codec
            .issue_opaque()
            .map_err(|err| AuthError::internal("Failed to generate refresh token", err))?;

        let expires_at = chrono::Duration::from_std(self.config.refresh_ttl())
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthError::internal("Invalid refresh token expiry duration", "out of range")
            })?;

        let record = RefreshRecord {
            token: refresh_token.clone(),
            subject,
            expires_at,
        };

        Ok((
            TokenPair {
                access_token,
                refresh_token,
                expires_in: self.config.access_ttl().as_secs(),
            },
            record,
        ))
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let passwords = Arc::clone(&self.passwords);
        let password = password.to_owned();
        task::spawn_blocking(move || passwords.hash(&password))
            .await
            .map_err(|err| AuthError::internal("Failed to hash password", err))?
            .map_err(|err| AuthError::internal("Failed to hash password", err))
    }

    async fn verify_password(&self, hash: String, password: &str) -> Result<bool, AuthError> {
        let passwords = Arc::clone(&self.passwords);
        let password = password.to_owned();
        task::spawn_blocking(move || passwords.verify(&hash, &password))
            .await
            .map_err(|err| AuthError::internal("Failed to verify password", err))?
            .map_err(|err| AuthError::internal("Failed to verify password", err))
    }
}

/// Normalize an email for lookup/uniqueness checks.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

fn check_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<&str, AuthError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::bad_request("Name is required"));
    }
    Ok(name)
}

fn user_not_found() -> AuthError {
    AuthError::NotFound("User not found".to_string())
}

fn account_failure(message: &'static str, err: AccountError) -> AuthError {
    match err {
        AccountError::Conflict => AuthError::Conflict(EMAIL_TAKEN.to_string()),
        AccountError::Backend(cause) => AuthError::internal(message, cause),
    }
}

fn store_failure(message: &'static str, err: StoreError) -> AuthError {
    match err {
        StoreError::Backend(cause) => AuthError::internal(message, cause),
        StoreError::NotFound => AuthError::internal(message, "refresh token not found"),
    }
}
