use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("echo_requests_total", "Total number of requests to rate limited routes").unwrap();
    pub static ref REQUESTS_THROTTLED: Counter =
        register_counter!("echo_requests_throttled_total", "Requests rejected with 429").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "echo_request_latency_seconds",
        "Latency of admitted requests in seconds"
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: Gauge =
        register_gauge!("echo_tracked_clients", "Client keys currently held by the rate limiter").unwrap();
}
