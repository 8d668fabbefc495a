//! Echo test endpoint guarded by a per-client fixed-window rate limiter,
//! plus a load tester that estimates the limit an endpoint enforces.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod sweeper;
pub mod tester;
