//! Cleanup service for deleting stale token records.
//!
//! Expiry is always checked at read time; this sweep only keeps the token
//! table from growing without bound.

use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use super::TokenStore;
use crate::config::CleanupSettings;
use crate::error::AppResult;

/// Start the cleanup background task.
///
/// This spawns a tokio task that periodically deletes token records whose
/// refresh token expired, or which were revoked, longer ago than the
/// retention period.
pub fn start_cleanup_task(tokens: TokenStore, settings: CleanupSettings) {
    tokio::spawn(async move {
        info!(
            "Starting token cleanup (retention: {} seconds, interval: {} seconds)",
            settings.retention_secs, settings.interval_secs
        );

        let mut ticker = interval(Duration::from_secs(settings.interval_secs.max(1)));

        loop {
            ticker.tick().await;

            if let Err(e) = run_cleanup(&tokens, &settings).await {
                error!("Cleanup task error: {}", e);
            }
        }
    });
}

/// Run a single cleanup cycle. Returns the number of records removed.
pub async fn run_cleanup(tokens: &TokenStore, settings: &CleanupSettings) -> AppResult<u64> {
    let retention = chrono::Duration::seconds(i64::try_from(settings.retention_secs).unwrap_or(0));
    let cutoff = Utc::now() - retention;

    let removed = tokens.purge_expired(cutoff).await?;
    if removed > 0 {
        info!("Token cleanup: {} stale records removed", removed);
    }

    Ok(removed)
}
