pub mod middleware;
pub mod routes;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get};
use axum::Router;
use scholarly_cache::CacheManager;
use scholarly_common::AppConfig;
use scholarly_rate_limit::RateLimiter;
use tower_http::cors::{Any, CorsLayer};

use crate::state::SharedState;

pub use state::{ApiMetrics, AppState, SharedState as SharedStateType};

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the public router. Every route sits behind the rate limiting
/// middleware; CORS wraps it so rejected requests still carry CORS headers.
pub fn build_api_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health_check))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .with_state(state)
        .layer(cors())
}

/// Build the operator router: limiter stats and resets, cache maintenance
/// and metrics. It is not rate limited and must only be served on the admin
/// listener.
pub fn build_admin_router(state: SharedState) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(routes::health::health_check))
        // Prometheus metrics
        .route("/api/metrics", get(routes::metrics::get_metrics))
        // Rate limiter inspection and reset
        .route("/api/rate-limit", delete(routes::rate_limit::reset_all))
        .route(
            "/api/rate-limit/{identifier}",
            get(routes::rate_limit::get_stats).delete(routes::rate_limit::reset_identifier),
        )
        // Cache maintenance
        .route("/api/cache", delete(routes::cache::clear_cache))
        .with_state(state)
        .layer(cors())
}

/// Serve the public API on `listen_addr` until `shutdown` resolves.
pub async fn run_api_server<F>(
    state: SharedState,
    listen_addr: &str,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("API server listening on {}", listen_addr);

    // Client addresses feed the limiter's identifiers.
    axum::serve(
        listener,
        build_api_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

/// Serve the admin API on `listen_addr` until `shutdown` resolves.
pub async fn run_admin_server<F>(
    state: SharedState,
    listen_addr: &str,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("admin API server listening on {}", listen_addr);

    axum::serve(listener, build_admin_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Convenience function to assemble a SharedState from its parts.
pub fn new_shared_state(
    config: AppConfig,
    rate_limiter: RateLimiter,
    cache: CacheManager,
) -> SharedState {
    Arc::new(AppState::new(config, rate_limiter, cache))
}
