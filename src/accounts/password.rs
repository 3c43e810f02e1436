//! One-way password hashing.
//!
//! Hashes are Argon2id PHC strings, so the parameters used at hash time travel
//! with the hash and verification keeps working after the cost is changed.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash,
    PasswordHasher as _, PasswordVerifier as _, Version,
};
use rand::rngs::OsRng;
use std::fmt::Debug;

pub trait PasswordHasher: Send + Sync + Debug {
    /// # Errors
    /// Returns an error if hashing fails.
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// Returns `Ok(false)` for a wrong password; `Err` only when the stored
    /// hash itself cannot be parsed.
    ///
    /// # Errors
    /// Returns an error if `hash` is not a valid PHC string.
    fn verify(&self, hash: &str, plaintext: &str) -> Result<bool>;
}

#[derive(Clone, Debug)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Argon2id with the default memory cost and `iterations` passes.
    ///
    /// # Errors
    /// Returns an error if `iterations` is out of range.
    pub fn new(iterations: u32) -> Result<Self> {
        let params = Params::new(
            Params::DEFAULT_M_COST,
            iterations,
            Params::DEFAULT_P_COST,
            None,
        )
        .map_err(|err| anyhow!("invalid Argon2 parameters: {err}"))?;
        Ok(Self { params })
    }

    #[must_use]
    pub fn from_params(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, hash: &str, plaintext: &str) -> Result<bool> {
        let parsed =
            PasswordHash::new(hash).map_err(|err| anyhow!("invalid password hash: {err}"))?;
        Ok(self
            .argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}
