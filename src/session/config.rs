//! Session configuration: signing key and credential lifetimes.

use anyhow::{anyhow, Result};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Minimum signing key length in bytes (HMAC-SHA256 block security).
pub const MIN_SIGNING_KEY_BYTES: usize = 32;

const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(168 * 60 * 60);

/// Immutable process-wide session settings, built once at startup and handed
/// to the codec and the session manager.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    signing_key: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionConfig {
    /// # Errors
    /// Returns an error if the signing key is shorter than [`MIN_SIGNING_KEY_BYTES`].
    pub fn new(signing_key: SecretString) -> Result<Self> {
        let len = signing_key.expose_secret().len();
        if len < MIN_SIGNING_KEY_BYTES {
            return Err(anyhow!(
                "signing key must be at least {MIN_SIGNING_KEY_BYTES} bytes, got {len}"
            ));
        }

        Ok(Self {
            signing_key,
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
        })
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    #[must_use]
    pub fn signing_key(&self) -> &SecretString {
        &self.signing_key
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}

/// Parse a lifetime such as `15m`, `168h` or `1h30m`.
///
/// Used as a clap value parser, so a bad value stops the process at startup.
///
/// # Errors
/// Returns an error for unparsable or zero durations, and for durations that
/// cannot be added to the current time.
pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    let duration = humantime::parse_duration(value.trim())
        .map_err(|err| format!("invalid duration '{value}': {err}"))?;
    if duration.is_zero() {
        return Err(format!("duration must be greater than zero: '{value}'"));
    }
    if !fits_in_calendar(duration) {
        return Err(format!("duration out of range: '{value}'"));
    }
    Ok(duration)
}

// Expiry instants are `now + ttl` in chrono and `iat + secs` in i64 claims.
fn fits_in_calendar(duration: Duration) -> bool {
    if i64::try_from(duration.as_secs()).is_err() {
        return false;
    }
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .is_some()
}
