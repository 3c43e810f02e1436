//! Access credential codec (`HS256` JWT) and opaque refresh token generation.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use std::{fmt, time::Duration};
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const ALG: &str = "HS256";
const TYP: &str = "JWT";

/// Raw bytes behind every opaque refresh token (256 bits).
pub const OPAQUE_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Why a credential was rejected. Callers only ever see
/// [`CodecError::InvalidCredential`]; the reason is kept for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    Algorithm,
    Signature,
    Expired,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Malformed => "malformed",
            Self::Algorithm => "unsupported algorithm",
            Self::Signature => "signature mismatch",
            Self::Expired => "expired",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid credential: {0}")]
    InvalidCredential(Rejection),
    #[error("invalid signing key")]
    Key,
    #[error("invalid credential lifetime")]
    Lifetime,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("random source failure")]
    Random(#[from] rand::Error),
}

/// Signs and verifies access credentials under one process-wide key.
///
/// Holds nothing mutable, so a single instance can be shared by every request.
#[derive(Clone)]
pub struct CredentialCodec {
    key: SecretString,
}

impl fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCodec").finish_non_exhaustive()
    }
}

impl CredentialCodec {
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    /// Issue a credential for `subject` valid for `ttl` from now.
    ///
    /// # Errors
    /// Returns an error if the lifetime overflows or signing fails.
    pub fn issue(&self, subject: Uuid, ttl: Duration) -> Result<String, CodecError> {
        self.issue_at(subject, ttl, Utc::now())
    }

    /// Issue a credential as if the current time were `now`.
    ///
    /// # Errors
    /// Returns an error if the lifetime overflows or signing fails.
    pub fn issue_at(
        &self,
        subject: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, CodecError> {
        let ttl = i64::try_from(ttl.as_secs()).map_err(|_| CodecError::Lifetime)?;
        let iat = now.timestamp();
        let exp = iat.checked_add(ttl).ok_or(CodecError::Lifetime)?;

        let header = AccessTokenHeader {
            alg: ALG.to_string(),
            typ: TYP.to_string(),
        };
        let claims = AccessTokenClaims {
            sub: subject.to_string(),
            iat,
            exp,
        };

        let signing_input = format!("{}.{}", b64e_json(&header)?, b64e_json(&claims)?);
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature)
        ))
    }

    /// Verify a credential against the wall clock and return its subject.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidCredential`] for any bad, forged or expired token.
    pub fn verify(&self, token: &str) -> Result<Uuid, CodecError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a credential as if the current time were `now`.
    ///
    /// Rejects when the signature does not match, the token is structurally
    /// malformed, or `now` is at or after the encoded expiry.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidCredential`] for any bad, forged or expired token.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, CodecError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CodecError::InvalidCredential(Rejection::Malformed));
        };

        let header: AccessTokenHeader = b64d_json(header_b64)?;
        if header.alg != ALG {
            return Err(CodecError::InvalidCredential(Rejection::Algorithm));
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64)
            .map_err(|_| CodecError::InvalidCredential(Rejection::Malformed))?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        // constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| CodecError::InvalidCredential(Rejection::Signature))?;

        let claims: AccessTokenClaims = b64d_json(claims_b64)?;
        if now.timestamp() >= claims.exp {
            return Err(CodecError::InvalidCredential(Rejection::Expired));
        }

        Uuid::parse_str(&claims.sub).map_err(|_| CodecError::InvalidCredential(Rejection::Malformed))
    }

    /// Generate an opaque, URL-safe refresh token with 256 bits of entropy.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn issue_opaque(&self) -> Result<String, CodecError> {
        let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }

    fn mac(&self) -> Result<HmacSha256, CodecError> {
        HmacSha256::new_from_slice(self.key.expose_secret().as_bytes()).map_err(|_| CodecError::Key)
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: DeserializeOwned>(value: &str) -> Result<T, CodecError> {
    let bytes = Base64UrlUnpadded::decode_vec(value)
        .map_err(|_| CodecError::InvalidCredential(Rejection::Malformed))?;
    serde_json::from_slice(&bytes).map_err(|_| CodecError::InvalidCredential(Rejection::Malformed))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn codec() -> CredentialCodec {
        CredentialCodec::new(SecretString::from(
            "test-signing-key-test-signing-key".to_string(),
        ))
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn rejection(result: Result<Uuid, CodecError>) -> Option<Rejection> {
        match result {
            Err(CodecError::InvalidCredential(reason)) => Some(reason),
            _ => None,
        }
    }

    #[test]
    fn verify_accepts_until_expiry_instant() {
        let codec = codec();
        let subject = Uuid::new_v4();
        let token = codec
            .issue_at(subject, Duration::from_secs(60), at(1_700_000_000))
            .unwrap();

        assert_eq!(codec.verify_at(&token, at(1_700_000_000)).unwrap(), subject);
        assert_eq!(codec.verify_at(&token, at(1_700_000_059)).unwrap(), subject);
        assert_eq!(
            rejection(codec.verify_at(&token, at(1_700_000_060))),
            Some(Rejection::Expired)
        );
        assert_eq!(
            rejection(codec.verify_at(&token, at(1_700_009_999))),
            Some(Rejection::Expired)
        );
    }

    #[test]
    fn verify_with_wall_clock() {
        let codec = codec();
        let subject = Uuid::new_v4();
        let token = codec.issue(subject, Duration::from_secs(300)).unwrap();
        assert_eq!(codec.verify(&token).unwrap(), subject);
    }

    #[test]
    fn token_encodes_subject_and_instants() {
        let codec = codec();
        let subject = Uuid::new_v4();
        let token = codec
            .issue_at(subject, Duration::from_secs(900), at(1_000))
            .unwrap();
        let claims_b64 = token.split('.').nth(1).unwrap();
        let claims: AccessTokenClaims = b64d_json(claims_b64).unwrap();
        assert_eq!(claims.sub, subject.to_string());
        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.exp, 1_900);
    }

    #[test]
    fn verify_rejects_other_key() {
        let subject = Uuid::new_v4();
        let token = codec()
            .issue_at(subject, Duration::from_secs(60), at(1_000))
            .unwrap();
        let other = CredentialCodec::new(SecretString::from(
            "another-signing-key-another-signing".to_string(),
        ));
        assert_eq!(
            rejection(other.verify_at(&token, at(1_001))),
            Some(Rejection::Signature)
        );
    }

    #[test]
    fn verify_rejects_tampered_claims() {
        let codec = codec();
        let token = codec
            .issue_at(Uuid::new_v4(), Duration::from_secs(60), at(1_000))
            .unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();

        let forged_claims = AccessTokenClaims {
            sub: Uuid::new_v4().to_string(),
            iat: 1_000,
            exp: 9_999_999_999,
        };
        let forged = b64e_json(&forged_claims).unwrap();
        parts[1] = &forged;
        let forged_token = parts.join(".");

        assert_eq!(
            rejection(codec.verify_at(&forged_token, at(1_001))),
            Some(Rejection::Signature)
        );
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let codec = codec();
        let token = codec
            .issue_at(Uuid::new_v4(), Duration::from_secs(60), at(1_000))
            .unwrap();
        let (signing_input, _) = token.rsplit_once('.').unwrap();
        let bogus = Base64UrlUnpadded::encode_string(&[7u8; 32]);
        let tampered = format!("{signing_input}.{bogus}");
        assert_eq!(
            rejection(codec.verify_at(&tampered, at(1_001))),
            Some(Rejection::Signature)
        );
    }

    #[test]
    fn verify_rejects_unsigned_algorithm() {
        let codec = codec();
        let header = AccessTokenHeader {
            alg: "none".to_string(),
            typ: TYP.to_string(),
        };
        let claims = AccessTokenClaims {
            sub: Uuid::new_v4().to_string(),
            iat: 1_000,
            exp: 2_000,
        };
        let token = format!(
            "{}.{}.",
            b64e_json(&header).unwrap(),
            b64e_json(&claims).unwrap()
        );
        assert_eq!(
            rejection(codec.verify_at(&token, at(1_001))),
            Some(Rejection::Algorithm)
        );
    }

    #[test]
    fn verify_rejects_malformed_tokens() {
        let codec = codec();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.???.***", "e30.e30.e30"] {
            assert!(
                matches!(
                    codec.verify_at(token, at(1_000)),
                    Err(CodecError::InvalidCredential(_))
                ),
                "token {token:?} should be rejected"
            );
        }
    }

    #[test]
    fn issue_opaque_is_url_safe_and_256_bits() {
        let token = codec().issue_opaque().unwrap();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        let decoded = Base64UrlUnpadded::decode_vec(&token).unwrap();
        assert_eq!(decoded.len(), OPAQUE_TOKEN_BYTES);
    }

    #[test]
    fn issue_opaque_values_are_distinct() {
        let codec = codec();
        let sample: HashSet<String> = (0..10_000).map(|_| codec.issue_opaque().unwrap()).collect();
        assert_eq!(sample.len(), 10_000);
    }

    #[test]
    fn debug_does_not_leak_key() {
        let debug = format!("{:?}", codec());
        assert!(!debug.contains("test-signing-key"));
    }
}
