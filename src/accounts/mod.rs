//! Account collaborator: user records and password hashing.
//!
//! The session manager looks accounts up by email or id, inserts them on
//! registration and updates or deletes them for the signed-in user.

mod memory;
mod password;
mod postgres;

pub use memory::MemoryAccounts;
pub use password::{Argon2Hasher, PasswordHasher};
pub use postgres::PgAccounts;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::{self, Debug};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Fields supplied on registration; id and creation time are assigned on save.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// Public view of an account, safe to return to clients.
#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AccountProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountProfile {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("email already registered")]
    Conflict,
    #[error("account storage failure")]
    Backend(#[source] anyhow::Error),
}

#[async_trait]
pub trait AccountRepository: Send + Sync + Debug {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AccountError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AccountError>;

    /// Insert a new account.
    ///
    /// # Errors
    /// [`AccountError::Conflict`] if the email is already taken, even when a
    /// concurrent registration won the race after the caller's own check.
    async fn save(&self, account: NewAccount) -> Result<Account, AccountError>;

    /// Replace name and password hash. `Ok(None)` when the account is gone.
    async fn update(
        &self,
        id: Uuid,
        name: &str,
        password_hash: &str,
    ) -> Result<Option<Account>, AccountError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, id: Uuid) -> Result<bool, AccountError>;
}
