use clap::Parser;
use tracing_subscriber::EnvFilter;

use rate_limited_echo::config::TesterArgs;
use rate_limited_echo::tester::{TestPlan, run_test};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = TesterArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let plan = TestPlan::from_args(&args)?;
    let summary = run_test(plan).await?;

    println!();
    println!("{}", summary);
    Ok(())
}
