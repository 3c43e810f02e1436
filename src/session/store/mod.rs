//! Refresh token storage.
//!
//! Records are keyed by subject (at most one live token per subject) and can
//! also be found by token value through a secondary index. Expiry is decided
//! by the reader; backends may reclaim expired rows but are never trusted to.

mod memory;
mod postgres;

pub use memory::MemoryRefreshStore;
pub use postgres::PgRefreshStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    pub token: String,
    pub subject: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl RefreshRecord {
    /// A record is dead at and after its expiry instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("refresh token not found")]
    NotFound,
    #[error("refresh token storage failure")]
    Backend(#[source] anyhow::Error),
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync + Debug {
    /// Upsert the record for its subject, replacing any previous token.
    async fn put(&self, record: RefreshRecord) -> Result<(), StoreError>;

    /// Find the record holding `token`, regardless of subject.
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshRecord>, StoreError>;

    /// Remove the subject's record. Succeeds when there is none.
    async fn delete_by_subject(&self, subject: Uuid) -> Result<(), StoreError>;

    /// Remove the record holding `token`.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if no record holds that value.
    async fn delete_by_token(&self, token: &str) -> Result<(), StoreError>;

    /// Replace the record holding `old_token` with `record` in one step.
    ///
    /// Returns `false` (and writes nothing) if `old_token` is no longer
    /// stored, which is how a concurrent or replayed refresh loses the race.
    async fn rotate(&self, old_token: &str, record: RefreshRecord) -> Result<bool, StoreError>;

    /// Drop records whose expiry is at or before `now`; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
