use std::sync::Arc;
use crate::rate_limit::RateLimitBackend;

// app's shared state
pub struct AppState {
    pub rate_limiter: Arc<dyn RateLimitBackend>,
}

impl AppState {
    pub fn new(rate_limiter: Arc<dyn RateLimitBackend>) -> Self {
        Self { rate_limiter }
    }
}
