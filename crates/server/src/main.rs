mod config;

use anyhow::Result;
use scholarly_cache::CacheManager;
use scholarly_rate_limit::RateLimiter;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoadedConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    // Optional first argument: config path
    let config_arg = std::env::args().nth(1);
    let server_config = LoadedConfig::load(config_arg.as_deref())?;
    let app_config = server_config.config;

    info!(
        config_path = ?server_config.config_path,
        listen = %app_config.server.listen,
        admin_listen = %app_config.server.admin.listen,
        "starting scholarly API"
    );

    let rate_limiter = RateLimiter::from_config(&app_config.rate_limit);
    let cache = CacheManager::connect(&app_config.cache).await;
    info!(backend = %cache.backend_type(), "cache ready");

    let api_listen = app_config.server.listen.clone();
    let admin_listen = app_config.server.admin.listen.clone();
    let state = scholarly_admin::new_shared_state(app_config, rate_limiter, cache.clone());

    // Both listeners stop on the same signal.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let result = tokio::try_join!(
        scholarly_admin::run_api_server(
            state.clone(),
            &api_listen,
            wait_for(shutdown_rx.clone())
        ),
        scholarly_admin::run_admin_server(state, &admin_listen, wait_for(shutdown_rx)),
    )
    .map(|_| ());

    cache.close().await;

    match result {
        Ok(()) => {
            info!("scholarly API stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "API server error");
            Err(e)
        }
    }
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    // A dropped sender also means shutdown.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        // Without a signal handler, keep serving until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
