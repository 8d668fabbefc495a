use std::sync::Arc;
use std::time::Instant;
use tokio::time::{Duration, interval};
use tracing::{debug, info};

use crate::metrics::TRACKED_CLIENTS;
use crate::rate_limit::RateLimitBackend;

// Evicts lapsed rate limit counters - runs every `purge_interval`
pub async fn purge_loop(rate_limiter: Arc<dyn RateLimitBackend>, purge_interval: Duration) {
    let mut interval = interval(purge_interval);

    info!(interval = ?purge_interval, "Expiry sweeper started");

    loop {
        interval.tick().await;
        sweep(rate_limiter.as_ref(), Instant::now());
    }
}

// Single pass, returns the number of evicted keys
pub fn sweep(rate_limiter: &dyn RateLimitBackend, now: Instant) -> usize {
    let removed = rate_limiter.purge_expired(now);
    let remaining = rate_limiter.tracked_keys();
    TRACKED_CLIENTS.set(remaining as f64);

    if removed > 0 {
        debug!(removed, remaining, "Evicted expired rate limit counters");
    }
    removed
}
