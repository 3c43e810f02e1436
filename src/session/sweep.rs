//! Background reclamation of expired refresh records.
//!
//! Purely housekeeping: expiry is already enforced when a token is presented,
//! so a missed or failed sweep never extends a session.

use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, error, info};

use super::SessionManager;

/// Run [`SessionManager::sweep_expired`] every `every` until the task is aborted.
pub fn spawn_sweeper(sessions: Arc<SessionManager>, every: Duration) -> JoinHandle<()> {
    info!("sweeping expired refresh tokens every {}", humantime::format_duration(every));

    let mut ticker = interval(every);

    tokio::spawn(async move {
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match sessions.sweep_expired().await {
                Ok(0) => debug!("no expired refresh tokens"),
                Ok(purged) => info!(purged, "purged expired refresh tokens"),
                Err(err) => error!("Failed to sweep expired refresh tokens: {err}"),
            }
        }
    })
}
