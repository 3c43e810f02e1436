use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use tracing::{info_span, instrument, Instrument, Span};
use uuid::Uuid;

use super::{RefreshRecord, RefreshTokenStore, StoreError};

/// PostgreSQL-backed store (`refresh_tokens` table, see `sql/schema.sql`).
///
/// Only a SHA-256 of the token value is persisted; lookups hash the presented
/// value, which also gives an indexed reverse lookup via the unique
/// `token_hash` column.
#[derive(Clone, Debug)]
pub struct PgRefreshStore {
    pool: PgPool,
}

impl PgRefreshStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

fn query_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn backend(err: sqlx::Error, what: &'static str) -> StoreError {
    StoreError::Backend(anyhow::Error::new(err).context(what))
}

#[async_trait]
impl RefreshTokenStore for PgRefreshStore {
    #[instrument(skip_all, fields(subject = %record.subject))]
    async fn put(&self, record: RefreshRecord) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO refresh_tokens (subject_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (subject_id)
            DO UPDATE SET token_hash = EXCLUDED.token_hash, expires_at = EXCLUDED.expires_at
        ";
        sqlx::query(query)
            .bind(record.subject)
            .bind(hash_token(&record.token))
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .map_err(|err| backend(err, "failed to save refresh token"))?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let query = "SELECT subject_id, expires_at FROM refresh_tokens WHERE token_hash = $1";
        let row = sqlx::query(query)
            .bind(hash_token(token))
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .map_err(|err| backend(err, "failed to lookup refresh token"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let subject: Uuid = row
            .try_get("subject_id")
            .map_err(|err| backend(err, "failed to decode refresh token row"))?;
        let expires_at: DateTime<Utc> = row
            .try_get("expires_at")
            .map_err(|err| backend(err, "failed to decode refresh token row"))?;

        Ok(Some(RefreshRecord {
            token: token.to_string(),
            subject,
            expires_at,
        }))
    }

    #[instrument(skip(self))]
    async fn delete_by_subject(&self, subject: Uuid) -> Result<(), StoreError> {
        let query = "DELETE FROM refresh_tokens WHERE subject_id = $1";
        sqlx::query(query)
            .bind(subject)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .map_err(|err| backend(err, "failed to delete refresh token"))?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn delete_by_token(&self, token: &str) -> Result<(), StoreError> {
        let query = "DELETE FROM refresh_tokens WHERE token_hash = $1";
        let result = sqlx::query(query)
            .bind(hash_token(token))
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .map_err(|err| backend(err, "failed to delete refresh token"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(subject = %record.subject))]
    async fn rotate(&self, old_token: &str, record: RefreshRecord) -> Result<bool, StoreError> {
        // Row lock serialises concurrent rotations of the same token; the loser
        // re-reads the row, no longer matches, and updates nothing.
        let query = r"
            UPDATE refresh_tokens
            SET token_hash = $3, expires_at = $4
            WHERE token_hash = $1 AND subject_id = $2
        ";
        let result = sqlx::query(query)
            .bind(hash_token(old_token))
            .bind(record.subject)
            .bind(hash_token(&record.token))
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .map_err(|err| backend(err, "failed to rotate refresh token"))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let query = "DELETE FROM refresh_tokens WHERE expires_at <= $1";
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .map_err(|err| backend(err, "failed to purge expired refresh tokens"))?;
        Ok(result.rows_affected())
    }
}
