mod metrics;

pub use metrics::metrics_handler;
pub use test::test_handler;
