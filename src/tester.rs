//! Load tester: concurrent workers hammer an endpoint until the first 429,
//! then the admitted rate is estimated from the successful requests.

use reqwest::{Method, StatusCode, header::CONTENT_TYPE};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::TesterArgs;
use crate::error::{AppError, Result};

pub const METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Validated tester input.
#[derive(Debug, Clone)]
pub struct TestPlan {
    pub url: String,
    pub method: Method,
    pub workers: usize,
    pub requests: usize,
    pub delay: Duration,
    pub payload: String,
}

impl TestPlan {
    pub fn from_args(args: &TesterArgs) -> Result<Self> {
        let url = args.url.trim().to_string();
        if url.is_empty() {
            return Err(AppError::Config("a target URL is required".into()));
        }
        if args.workers == 0 || args.requests == 0 {
            return Err(AppError::Config(
                "workers and requests must be positive numbers".into(),
            ));
        }

        let method_name = args.method.trim().to_ascii_uppercase();
        if !METHODS.contains(&method_name.as_str()) {
            return Err(AppError::Config(format!(
                "unsupported method {}, expected one of {}",
                args.method,
                METHODS.join(", ")
            )));
        }
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|e| AppError::Config(e.to_string()))?;

        let payload = args.payload.trim().to_string();
        if method != Method::GET {
            if payload.is_empty() {
                warn!("JSON payload is empty, continuing with an empty body");
            } else if serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&payload)
                .is_err()
            {
                return Err(AppError::Config(
                    "payload must be a valid JSON object".into(),
                ));
            }
        }

        Ok(Self {
            url,
            method,
            workers: args.workers,
            requests: args.requests,
            delay: Duration::from_millis(args.delay_ms),
            payload,
        })
    }
}

#[derive(Default)]
struct Progress {
    successes: AtomicUsize,
    rate_limited: AtomicUsize,
    other_errors: AtomicUsize,
    stop_all: AtomicBool,
    success_times: Mutex<Vec<Instant>>,
    first_429: Mutex<Option<Instant>>,
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSummary {
    pub attempted: usize,
    pub successes: usize,
    pub rate_limited: usize,
    pub other_errors: usize,
    pub estimated_rpm: f64,
    pub duration: Duration,
}

impl fmt::Display for TestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Test Summary ===")?;
        writeln!(f, "Total Requests Attempted (workers * max requests): {}", self.attempted)?;
        writeln!(f, "Successful Requests (200): {}", self.successes)?;
        writeln!(f, "Rate Limited Responses (429): {}", self.rate_limited)?;
        writeln!(f, "Other Errors: {}", self.other_errors)?;
        writeln!(f, "Estimated Rate Limit: {:.2} requests per minute", self.estimated_rpm)?;
        write!(f, "Total Test Duration: {:.2} seconds", self.duration.as_secs_f64())
    }
}

/// Successes at or before `cutoff`, per minute elapsed since `start`.
pub fn estimate_rpm(success_times: &[Instant], start: Instant, cutoff: Instant) -> f64 {
    let admitted = success_times.iter().filter(|&&t| t <= cutoff).count();
    let minutes = cutoff.saturating_duration_since(start).as_secs_f64() / 60.0;
    if admitted == 0 || minutes <= 0.0 {
        return 0.0;
    }
    admitted as f64 / minutes
}

pub async fn run_test(plan: TestPlan) -> Result<TestSummary> {
    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let plan = Arc::new(plan);
    let progress = Arc::new(Progress::default());

    info!(
        url = %plan.url,
        method = %plan.method,
        workers = plan.workers,
        requests = plan.requests,
        "Starting test"
    );

    let start = Instant::now();
    let handles: Vec<_> = (1..=plan.workers)
        .map(|id| {
            tokio::spawn(worker(
                format!("User-{}", id),
                client.clone(),
                Arc::clone(&plan),
                Arc::clone(&progress),
            ))
        })
        .collect();

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Worker task failed");
        }
    }
    let end = Instant::now();

    let cutoff = progress.first_429.lock().await.unwrap_or(end);
    let estimated_rpm = estimate_rpm(&progress.success_times.lock().await, start, cutoff);

    Ok(TestSummary {
        attempted: plan.workers.saturating_mul(plan.requests),
        successes: progress.successes.load(Ordering::SeqCst),
        rate_limited: progress.rate_limited.load(Ordering::SeqCst),
        other_errors: progress.other_errors.load(Ordering::SeqCst),
        estimated_rpm,
        duration: end - start,
    })
}

async fn worker(name: String, client: reqwest::Client, plan: Arc<TestPlan>, progress: Arc<Progress>) {
    for _ in 0..plan.requests {
        if progress.stop_all.load(Ordering::SeqCst) {
            info!(worker = %name, "Stopped due to global rate limit");
            break;
        }

        let started = Instant::now();
        let mut request = client.request(plan.method.clone(), &plan.url);
        if plan.method != Method::GET {
            request = request
                .header(CONTENT_TYPE, "application/json; charset=UTF-8")
                .body(plan.payload.clone());
        }

        match request.send().await {
            Ok(res) => {
                let status = res.status();
                let elapsed = started.elapsed();
                if status == StatusCode::OK {
                    progress.successes.fetch_add(1, Ordering::SeqCst);
                    progress.success_times.lock().await.push(Instant::now());
                    info!(worker = %name, ?elapsed, "200 OK");
                } else if status == StatusCode::TOO_MANY_REQUESTS {
                    progress.rate_limited.fetch_add(1, Ordering::SeqCst);
                    {
                        let mut first_429 = progress.first_429.lock().await;
                        if first_429.is_none() {
                            *first_429 = Some(Instant::now());
                        }
                    }
                    progress.stop_all.store(true, Ordering::SeqCst);
                    warn!(worker = %name, ?elapsed, "429 Rate Limited - stopping all workers");
                    break;
                } else {
                    progress.other_errors.fetch_add(1, Ordering::SeqCst);
                    warn!(worker = %name, %status, ?elapsed, "Unexpected response");
                }
            }
            Err(e) => {
                progress.other_errors.fetch_add(1, Ordering::SeqCst);
                warn!(worker = %name, error = %e, "Request failed");
            }
        }

        tokio::time::sleep(plan.delay).await;
    }
    info!(worker = %name, "Worker finished");
}
