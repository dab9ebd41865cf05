//! Periodic housekeeping
//!
//! Prunes idle rate-limiter buckets and expired password-reset tokens.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::middleware::RateLimiter;
use crate::store::Store;

pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Buckets untouched for this long are dropped
const BUCKET_MAX_IDLE: Duration = Duration::from_secs(600);

/// One housekeeping pass; returns (buckets pruned, tokens purged)
pub async fn run_once(store: &dyn Store, rate_limiter: &RateLimiter) -> (usize, u64) {
    let buckets = rate_limiter.prune(BUCKET_MAX_IDLE).await;

    let tokens = match store.purge_expired_reset_tokens(Utc::now()).await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(error = %e, "Failed to purge expired reset tokens");
            0
        }
    };

    if buckets > 0 || tokens > 0 {
        tracing::info!(buckets, tokens, "Maintenance pass completed");
    }
    (buckets, tokens)
}

/// Background job; runs until the task is dropped
pub async fn maintenance_loop(store: Arc<dyn Store>, rate_limiter: RateLimiter) {
    tracing::info!("Starting maintenance task");

    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        run_once(store.as_ref(), &rate_limiter).await;
    }
}
