//! Scheduled cleanup of expired refresh tokens.
//!
//! Runs on a fixed schedule, never per request. A failed sweep is logged and
//! retried on the next tick; it never affects request handling.

use crate::db::{Database, unix_now};
use std::time::Duration;
use tracing::{error, info};

/// Interval between refresh token sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Delete all refresh tokens past expiry.
pub async fn run_sweep(db: &Database) {
    match db.refresh_tokens().delete_expired(unix_now()).await {
        Ok(count) if count > 0 => info!("Swept {} expired refresh tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to sweep expired refresh tokens: {}", e),
    }
}

/// Spawn a background task that sweeps periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_sweep_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            interval.tick().await;
            run_sweep(&db).await;
        }
    })
}
