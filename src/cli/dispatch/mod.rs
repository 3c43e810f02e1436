use crate::{
    cli::{actions::server, actions::Action, commands},
    session::SessionConfig,
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// Build the action from parsed arguments.
///
/// # Errors
/// Returns an error if a required argument is missing or the signing key is too short.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let duration = |name: &str| -> Result<Duration> {
        matches
            .get_one::<Duration>(name)
            .copied()
            .ok_or_else(|| anyhow!("missing required argument: --{name}"))
    };

    let secret = matches
        .get_one::<String>(commands::ARG_JWT_SECRET)
        .cloned()
        .ok_or_else(|| anyhow!("missing required argument: --{}", commands::ARG_JWT_SECRET))?;

    let session = SessionConfig::new(SecretString::from(secret))
        .context("Invalid --jwt-secret")?
        .with_access_ttl(duration(commands::ARG_ACCESS_TTL)?)
        .with_refresh_ttl(duration(commands::ARG_REFRESH_TTL)?);

    Ok(Action::Server(server::Args {
        port: matches
            .get_one::<u16>(commands::ARG_PORT)
            .copied()
            .unwrap_or(8080),
        dsn: matches
            .get_one::<String>(commands::ARG_DSN)
            .map(|dsn| SecretString::from(dsn.clone())),
        session,
        hash_cost: matches
            .get_one::<u32>(commands::ARG_HASH_COST)
            .copied()
            .unwrap_or(2),
        request_timeout: duration(commands::ARG_REQUEST_TIMEOUT)?,
        sweep_interval: matches
            .get_one::<Duration>(commands::ARG_SWEEP_INTERVAL)
            .copied(),
    }))
}
