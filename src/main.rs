use clap::Parser; // for cli
use tracing_subscriber::EnvFilter;

use rate_limited_echo::config::Args;
use rate_limited_echo::server;

// this is main async function with tokio
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();

    // --debug raises the default level, RUST_LOG still wins
    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    server::run(args).await?;
    Ok(())
}
