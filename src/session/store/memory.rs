use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{RefreshRecord, RefreshTokenStore, StoreError};

/// Primary (subject) and secondary (token) maps. Always mutated together
/// under the same write guard.
#[derive(Debug, Default)]
struct Index {
    by_subject: HashMap<Uuid, RefreshRecord>,
    by_token: HashMap<String, Uuid>,
}

impl Index {
    fn insert(&mut self, record: RefreshRecord) {
        if let Some(previous) = self.by_subject.remove(&record.subject) {
            self.by_token.remove(&previous.token);
        }
        self.by_token.insert(record.token.clone(), record.subject);
        self.by_subject.insert(record.subject, record);
    }

    fn remove_subject(&mut self, subject: Uuid) -> Option<RefreshRecord> {
        let record = self.by_subject.remove(&subject)?;
        self.by_token.remove(&record.token);
        Some(record)
    }

    fn subject_for(&self, token: &str) -> Option<Uuid> {
        self.by_token.get(token).copied()
    }

    fn purge(&mut self, now: DateTime<Utc>) -> u64 {
        let expired: Vec<Uuid> = self
            .by_subject
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.subject)
            .collect();
        for subject in &expired {
            self.remove_subject(*subject);
        }
        expired.len() as u64
    }
}

/// In-process refresh token store with an O(1) token index.
///
/// Expired records are reclaimed on every `put`, so subjects that never come
/// back do not pin memory when no sweep is configured.
#[derive(Debug, Default)]
pub struct MemoryRefreshStore {
    index: RwLock<Index>,
}

impl MemoryRefreshStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshStore {
    #[instrument(skip_all, fields(subject = %record.subject))]
    async fn put(&self, record: RefreshRecord) -> Result<(), StoreError> {
        let mut index = self.index.write().await;
        let reclaimed = index.purge(Utc::now());
        if reclaimed > 0 {
            debug!(reclaimed, "reclaimed expired refresh tokens");
        }
        index.insert(record);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let index = self.index.read().await;
        Ok(index
            .subject_for(token)
            .and_then(|subject| index.by_subject.get(&subject))
            .filter(|record| record.token == token)
            .cloned())
    }

    #[instrument(skip(self))]
    async fn delete_by_subject(&self, subject: Uuid) -> Result<(), StoreError> {
        self.index.write().await.remove_subject(subject);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn delete_by_token(&self, token: &str) -> Result<(), StoreError> {
        let mut index = self.index.write().await;
        let subject = index.subject_for(token).ok_or(StoreError::NotFound)?;
        index.remove_subject(subject);
        Ok(())
    }

    #[instrument(skip_all, fields(subject = %record.subject))]
    async fn rotate(&self, old_token: &str, record: RefreshRecord) -> Result<bool, StoreError> {
        let mut index = self.index.write().await;
        let Some(subject) = index
            .subject_for(old_token)
            .filter(|subject| *subject == record.subject)
        else {
            return Ok(false);
        };
        index.remove_subject(subject);
        index.insert(record);
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.index.write().await.purge(now))
    }
}
