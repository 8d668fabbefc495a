use clap::Parser;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::rate_limit::Quota;

/// Upper bound for `--rate-window` and `--purge-interval`: one year.
pub const MAX_PERIOD_SECS: u64 = 365 * 24 * 60 * 60;

// CLI argument structure for the echo server
#[derive(Parser, Debug, Clone)]
#[command(name = "rate-limited-echo")]
#[command(about = "Echo test endpoint guarded by a per-client rate limiter")]
pub struct Args {
    // Interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, default_value_t = 5000)]
    pub port: u16,

    // Verbose logging
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,

    // Rate limit max requests per window
    #[arg(long, default_value_t = 50)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    // How often expired counters are evicted, in seconds
    #[arg(long, default_value_t = 60)]
    pub purge_interval: u64,
}

impl Args {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validated quota built from `--rate-limit` and `--rate-window`.
    pub fn quota(&self) -> Result<Quota> {
        if self.rate_limit == 0 {
            return Err(AppError::Config("--rate-limit must be greater than 0".into()));
        }
        if self.rate_window == 0 || self.rate_window > MAX_PERIOD_SECS {
            return Err(AppError::Config(format!(
                "--rate-window must be between 1 and {} seconds",
                MAX_PERIOD_SECS
            )));
        }
        Ok(Quota::new(self.rate_limit, Duration::from_secs(self.rate_window)))
    }

    pub fn purge_interval(&self) -> Result<Duration> {
        if self.purge_interval == 0 || self.purge_interval > MAX_PERIOD_SECS {
            return Err(AppError::Config(format!(
                "--purge-interval must be between 1 and {} seconds",
                MAX_PERIOD_SECS
            )));
        }
        Ok(Duration::from_secs(self.purge_interval))
    }
}

// CLI argument structure for the load tester
#[derive(Parser, Debug, Clone)]
#[command(name = "rate-tester")]
#[command(about = "Fires concurrent requests until the first 429 and estimates the rate limit")]
pub struct TesterArgs {
    // Target endpoint
    #[arg(short, long, default_value = "http://127.0.0.1:5000/test")]
    pub url: String,

    // GET, POST, PUT or DELETE
    #[arg(short, long, default_value = "GET")]
    pub method: String,

    // Number of concurrent workers
    #[arg(short, long, default_value_t = 5)]
    pub workers: usize,

    // Max requests per worker
    #[arg(short, long, default_value_t = 100)]
    pub requests: usize,

    // Delay between requests of one worker, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub delay_ms: u64,

    // JSON object sent as body for non-GET methods
    #[arg(long, default_value = "")]
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let args = Args::parse_from(["rate-limited-echo"]);
        assert_eq!(args.port, 5000);
        assert_eq!(args.bind_addr(), "127.0.0.1:5000");
        assert!(!args.debug);

        let quota = args.quota().unwrap();
        assert_eq!(quota.limit, 50);
        assert_eq!(quota.window, Duration::from_secs(60));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let args = Args::parse_from(["rate-limited-echo", "--rate-limit", "0"]);
        assert!(matches!(args.quota(), Err(AppError::Config(_))));

        let args = Args::parse_from(["rate-limited-echo", "--rate-window", "0"]);
        assert!(matches!(args.quota(), Err(AppError::Config(_))));
    }

    #[test]
    fn oversized_periods_are_rejected() {
        let args = Args::parse_from([
            "rate-limited-echo",
            "--rate-limit",
            "1",
            "--rate-window",
            "18446744073709551615",
        ]);
        assert!(matches!(args.quota(), Err(AppError::Config(_))));

        let args = Args::parse_from(["rate-limited-echo", "--purge-interval", "18446744073709551615"]);
        assert!(matches!(args.purge_interval(), Err(AppError::Config(_))));

        let limit = MAX_PERIOD_SECS.to_string();
        let args = Args::parse_from([
            "rate-limited-echo",
            "--rate-window",
            limit.as_str(),
            "--purge-interval",
            limit.as_str(),
        ]);
        assert!(args.quota().is_ok());
        assert!(args.purge_interval().is_ok());
    }

    #[test]
    fn tester_flags() {
        let args = TesterArgs::parse_from([
            "rate-tester",
            "--method",
            "POST",
            "-w",
            "3",
            "--payload",
            r#"{"a":1}"#,
        ]);
        assert_eq!(args.method, "POST");
        assert_eq!(args.workers, 3);
        assert_eq!(args.requests, 100);
        assert_eq!(args.delay_ms, 100);
    }
}
