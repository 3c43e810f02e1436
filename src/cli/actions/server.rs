use crate::{
    accounts::{AccountRepository, Argon2Hasher, MemoryAccounts, PgAccounts},
    api,
    cli::telemetry,
    db,
    session::{
        spawn_sweeper,
        store::{MemoryRefreshStore, PgRefreshStore, RefreshTokenStore},
        SessionConfig, SessionManager,
    },
};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub session: SessionConfig,
    pub hash_cost: u32,
    pub request_timeout: Duration,
    pub sweep_interval: Option<Duration>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let passwords = Arc::new(Argon2Hasher::new(args.hash_cost)?);

    let accounts: Arc<dyn AccountRepository>;
    let refresh_tokens: Arc<dyn RefreshTokenStore>;

    if let Some(dsn) = &args.dsn {
        let dsn = dsn.expose_secret();
        info!("Using database {}", redact_dsn(dsn)?);

        let pool = db::connect(dsn).await?;
        db::apply_schema(&pool)
            .await
            .context("Failed to apply database schema")?;

        accounts = Arc::new(PgAccounts::new(pool.clone()));
        refresh_tokens = Arc::new(PgRefreshStore::new(pool));
    } else {
        warn!("No DSN configured, accounts and sessions are kept in memory");
        accounts = Arc::new(MemoryAccounts::new());
        refresh_tokens = Arc::new(MemoryRefreshStore::new());
    }

    let sessions = Arc::new(SessionManager::new(
        args.session,
        accounts,
        refresh_tokens,
        passwords,
    )?);

    let sweeper = args
        .sweep_interval
        .map(|every| spawn_sweeper(sessions.clone(), every));

    let result = api::new(args.port, sessions, args.request_timeout).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    telemetry::shutdown_tracer();

    result
}

/// DSN with the password masked, for logs.
fn redact_dsn(dsn: &str) -> Result<String> {
    let mut url = Url::parse(dsn).context("Invalid DSN")?;
    if url.password().is_some() {
        url.set_password(Some("****"))
            .map_err(|()| anyhow!("Error masking DSN password"))?;
    }
    Ok(url.to_string())
}
