use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{Account, AccountError, AccountRepository, NewAccount};

/// PostgreSQL-backed account repository (`users` table).
#[derive(Clone, Debug)]
pub struct PgAccounts {
    pool: PgPool,
}

impl PgAccounts {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn backend(err: sqlx::Error, what: &'static str) -> AccountError {
    AccountError::Backend(anyhow::Error::new(err).context(what))
}

fn account_from_row(row: &PgRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl AccountRepository for PgAccounts {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AccountError> {
        let query =
            "SELECT id, email, name, password_hash, created_at FROM users WHERE email = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| backend(err, "failed to lookup account by email"))?;

        row.as_ref()
            .map(account_from_row)
            .transpose()
            .map_err(|err| backend(err, "failed to decode account row"))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AccountError> {
        let query = "SELECT id, email, name, password_hash, created_at FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| backend(err, "failed to lookup account by id"))?;

        row.as_ref()
            .map(account_from_row)
            .transpose()
            .map_err(|err| backend(err, "failed to decode account row"))
    }

    async fn save(&self, account: NewAccount) -> Result<Account, AccountError> {
        let query = r"
            INSERT INTO users
                (id, email, name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, name, password_hash, created_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(&account.email)
            .bind(&account.name)
            .bind(&account.password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => {
                account_from_row(&row).map_err(|err| backend(err, "failed to decode account row"))
            }
            Err(err) if is_unique_violation(&err) => Err(AccountError::Conflict),
            Err(err) => Err(backend(err, "failed to insert account")),
        }
    }

    async fn update(
        &self,
        id: Uuid,
        name: &str,
        password_hash: &str,
    ) -> Result<Option<Account>, AccountError> {
        let query = r"
            UPDATE users
            SET name = $2, password_hash = $3
            WHERE id = $1
            RETURNING id, email, name, password_hash, created_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .bind(name)
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| backend(err, "failed to update account"))?;

        row.as_ref()
            .map(account_from_row)
            .transpose()
            .map_err(|err| backend(err, "failed to decode account row"))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AccountError> {
        let query = "DELETE FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| backend(err, "failed to delete account"))?;

        Ok(result.rows_affected() > 0)
    }
}
