//! Router assembly and server startup.

use axum::{
    Router, middleware,
    routing::get,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::config::Args;
use crate::error::{AppError, Result};
use crate::handlers::{metrics_handler, test_handler};
use crate::rate_limit::{RateLimitBackend, RateLimiter, rate_limit_middleware};
use crate::state::AppState;
use crate::sweeper::purge_loop;

/// Routes behind the limiter come first; `route_layer` only wraps routes
/// registered before it, so `/metrics` stays unthrottled.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/test", get(test_handler).post(test_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

/// Bind, start the sweeper and serve until Ctrl+C or SIGTERM.
pub async fn run(args: Args) -> Result<()> {
    let quota = args.quota()?;
    let purge_interval = args.purge_interval()?;

    let rate_limiter: Arc<dyn RateLimitBackend> = Arc::new(RateLimiter::new(quota));
    let state = Arc::new(AppState::new(rate_limiter.clone()));

    tokio::spawn(purge_loop(rate_limiter, purge_interval));

    let addr = args.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("Echo server running on http://{}", addr);
    info!("Rate limit: {} per client", quota);

    serve(listener, state, shutdown_signal()).await?;

    info!("Echo server stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
