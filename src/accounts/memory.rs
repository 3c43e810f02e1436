use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Account, AccountError, AccountRepository, NewAccount};

#[derive(Debug, Default)]
struct Accounts {
    by_id: HashMap<Uuid, Account>,
    by_email: HashMap<String, Uuid>,
}

/// In-process account repository, used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryAccounts {
    inner: RwLock<Accounts>,
}

impl MemoryAccounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccounts {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AccountError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_email
            .get(email)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AccountError> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn save(&self, account: NewAccount) -> Result<Account, AccountError> {
        let mut inner = self.inner.write().await;
        if inner.by_email.contains_key(&account.email) {
            return Err(AccountError::Conflict);
        }

        let account = Account {
            id: Uuid::now_v7(),
            email: account.email,
            name: account.name,
            password_hash: account.password_hash,
            created_at: Utc::now(),
        };
        inner.by_email.insert(account.email.clone(), account.id);
        inner.by_id.insert(account.id, account.clone());
        Ok(account)
    }

    async fn update(
        &self,
        id: Uuid,
        name: &str,
        password_hash: &str,
    ) -> Result<Option<Account>, AccountError> {
        let mut inner = self.inner.write().await;
        Ok(inner.by_id.get_mut(&id).map(|account| {
            name.clone_into(&mut account.name);
            password_hash.clone_into(&mut account.password_hash);
            account.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AccountError> {
        let mut inner = self.inner.write().await;
        let Some(account) = inner.by_id.remove(&id) else {
            return Ok(false);
        };
        inner.by_email.remove(&account.email);
        Ok(true)
    }
}
