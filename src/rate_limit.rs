//! Fixed-window rate limiting keyed by client address.

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{StatusCode, header::RETRY_AFTER, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL, REQUESTS_THROTTLED, TRACKED_CLIENTS};
use crate::state::AppState;

/// Bucket used when the remote address of a request is not known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Requests allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub window: Duration,
}

impl Quota {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self::per_minute(50)
    }
}

// "50 per 1 minute", "10 per 30 second"
impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.window.as_secs();
        if self.window.subsec_nanos() != 0 || secs == 0 {
            write!(f, "{} per {} millisecond", self.limit, self.window.as_millis())
        } else if secs % 3600 == 0 {
            write!(f, "{} per {} hour", self.limit, secs / 3600)
        } else if secs % 60 == 0 {
            write!(f, "{} per {} minute", self.limit, secs / 60)
        } else {
            write!(f, "{} per {} second", self.limit, secs)
        }
    }
}

/// Outcome of a single rate limit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow { remaining: u32 },
    Deny { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow { .. })
    }
}

// Rate limit entry - tracks requests per IP/key
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

impl RateLimitEntry {
    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }
}

/// Storage for per-client counters.
///
/// The in-memory [`RateLimiter`] is the only implementation; handlers hold an
/// `Arc<dyn RateLimitBackend>` so a shared store can be swapped in.
pub trait RateLimitBackend: Send + Sync {
    /// Count one request from `key` at `now` and decide whether it is admitted.
    fn check_and_increment(&self, key: &str, now: Instant) -> Admission;

    /// Drop every counter whose window lapsed before `now`, returning how many were removed.
    fn purge_expired(&self, now: Instant) -> usize;

    fn tracked_keys(&self) -> usize;

    fn quota(&self) -> Quota;

    fn check(&self, key: &str) -> Admission {
        self.check_and_increment(key, Instant::now())
    }
}

/// Process-local fixed-window limiter.
///
/// Each key's read-modify-write runs under its DashMap shard lock, so
/// concurrent checks for the same key never admit more than `quota.limit`
/// requests per window.
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    quota: Quota,
}

impl RateLimiter {
    pub fn new(quota: Quota) -> Self {
        Self {
            entries: DashMap::new(),
            quota,
        }
    }

    #[cfg(test)]
    fn count(&self, key: &str) -> Option<u32> {
        self.entries.get(key).map(|entry| entry.count)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Quota::default())
    }
}

impl RateLimitBackend for RateLimiter {
    fn check_and_increment(&self, key: &str, now: Instant) -> Admission {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });

        // window expired..? start a new one
        if entry.is_expired(now, self.quota.window) {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.quota.limit {
            entry.count += 1;
            return Admission::Allow {
                remaining: self.quota.limit - entry.count,
            };
        }

        let elapsed = now.saturating_duration_since(entry.window_start);
        Admission::Deny {
            retry_after: self.quota.window.saturating_sub(elapsed),
        }
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let window = self.quota.window;
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now, window);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    fn quota(&self) -> Quota {
        self.quota
    }
}

/// Derive the client key from the connection's remote address.
pub async fn client_key(parts: &mut Parts) -> String {
    match ConnectInfo::<SocketAddr>::from_request_parts(parts, &()).await {
        Ok(ConnectInfo(addr)) => addr.ip().to_string(),
        Err(_) => UNKNOWN_CLIENT.to_string(),
    }
}

/// Admits the request or answers 429 before it reaches the handler.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    REQUEST_TOTAL.inc();

    let (mut parts, body) = request.into_parts();
    let key = client_key(&mut parts).await;
    let request = Request::from_parts(parts, body);

    let admission = state.rate_limiter.check(&key);
    TRACKED_CLIENTS.set(state.rate_limiter.tracked_keys() as f64);

    match admission {
        Admission::Allow { remaining } => {
            debug!(client = %key, remaining, "Request admitted");
            let start_time = Instant::now();
            let response = next.run(request).await;
            REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
            response
        }
        Admission::Deny { retry_after } => {
            REQUESTS_THROTTLED.inc();
            debug!(client = %key, ?retry_after, "Rate limit exceeded");
            too_many_requests(state.rate_limiter.quota(), retry_after)
        }
    }
}

fn too_many_requests(quota: Quota, retry_after: Duration) -> Response {
    // whole seconds, rounded up
    let secs = retry_after
        .as_secs()
        .saturating_add(u64::from(retry_after.subsec_nanos() > 0));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(RETRY_AFTER, secs.to_string())],
        Json(serde_json::json!({
            "error": "Too Many Requests",
            "message": quota.to_string(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_first_fifty_allowed_then_denied() {
        let limiter = RateLimiter::default();
        let now = Instant::now();

        for i in 0..50 {
            let admission = limiter.check_and_increment("10.0.0.1", now);
            assert_eq!(admission, Admission::Allow { remaining: 49 - i });
        }

        // The 51st request should be rejected
        assert!(!limiter.check_and_increment("10.0.0.1", now).is_allowed());
        assert_eq!(limiter.count("10.0.0.1"), Some(50));
    }

    #[test]
    fn test_denied_request_does_not_increment() {
        let limiter = RateLimiter::new(Quota::new(2, WINDOW));
        let now = Instant::now();

        limiter.check_and_increment("k", now);
        limiter.check_and_increment("k", now);
        for _ in 0..5 {
            assert!(!limiter.check_and_increment("k", now).is_allowed());
        }
        assert_eq!(limiter.count("k"), Some(2));
    }

    #[test]
    fn test_window_rollover_resets_counter() {
        let limiter = RateLimiter::new(Quota::new(3, WINDOW));
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_and_increment("k", start).is_allowed());
        }

        let almost = start + WINDOW - Duration::from_millis(1);
        assert!(!limiter.check_and_increment("k", almost).is_allowed());

        let rolled = start + WINDOW;
        assert_eq!(
            limiter.check_and_increment("k", rolled),
            Admission::Allow { remaining: 2 }
        );
        assert_eq!(limiter.count("k"), Some(1));
    }

    #[test]
    fn test_retry_after_counts_down_to_window_end() {
        let limiter = RateLimiter::new(Quota::new(1, WINDOW));
        let start = Instant::now();

        limiter.check_and_increment("k", start);
        let later = start + Duration::from_secs(45);
        assert_eq!(
            limiter.check_and_increment("k", later),
            Admission::Deny {
                retry_after: Duration::from_secs(15)
            }
        );
    }

    #[test]
    fn test_extreme_window_denies_without_overflow() {
        let limiter = RateLimiter::new(Quota::new(1, Duration::MAX));
        let now = Instant::now();

        assert!(limiter.check_and_increment("k", now).is_allowed());
        let later = now + Duration::from_secs(5);
        assert_eq!(
            limiter.check_and_increment("k", later),
            Admission::Deny {
                retry_after: Duration::MAX - Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(Quota::new(2, WINDOW));
        let now = Instant::now();

        limiter.check_and_increment("a", now);
        limiter.check_and_increment("a", now);
        assert!(!limiter.check_and_increment("a", now).is_allowed());

        assert!(limiter.check_and_increment("b", now).is_allowed());
        assert_eq!(limiter.count("b"), Some(1));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::default());
        let now = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || {
                    (0..10)
                        .filter(|_| limiter.check_and_increment("shared", now).is_allowed())
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }

    #[test]
    fn test_purge_removes_only_expired_entries() {
        let limiter = RateLimiter::new(Quota::new(5, WINDOW));
        let start = Instant::now();

        limiter.check_and_increment("old", start);
        limiter.check_and_increment("fresh", start + Duration::from_secs(30));

        let removed = limiter.purge_expired(start + WINDOW);
        assert_eq!(removed, 1);
        assert_eq!(limiter.count("old"), None);
        assert_eq!(limiter.count("fresh"), Some(1));
    }

    #[test]
    fn test_zero_limit_denies_everything() {
        let limiter = RateLimiter::new(Quota::new(0, WINDOW));
        let now = Instant::now();
        assert!(!limiter.check_and_increment("k", now).is_allowed());
        assert!(!limiter.check_and_increment("k", now + WINDOW).is_allowed());
    }

    #[test]
    fn test_quota_display() {
        assert_eq!(Quota::default().to_string(), "50 per 1 minute");
        assert_eq!(Quota::new(10, Duration::from_secs(30)).to_string(), "10 per 30 second");
        assert_eq!(Quota::new(7, Duration::from_secs(7200)).to_string(), "7 per 2 hour");
        assert_eq!(
            Quota::new(3, Duration::from_millis(500)).to_string(),
            "3 per 500 millisecond"
        );
    }

    #[test]
    fn test_too_many_requests_rounds_retry_after_up() {
        let response = too_many_requests(Quota::default(), Duration::from_millis(1500));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "2");

        let response = too_many_requests(Quota::new(1, Duration::MAX), Duration::MAX);
        assert_eq!(response.headers()[RETRY_AFTER], u64::MAX.to_string().as_str());
    }
}
