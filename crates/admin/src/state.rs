use std::sync::Arc;

use prometheus::{IntCounter, Opts, Registry};
use scholarly_cache::CacheManager;
use scholarly_common::AppConfig;
use scholarly_rate_limit::RateLimiter;

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// Central application state: configuration plus the long-lived services
/// constructed once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub rate_limiter: RateLimiter,
    pub cache: CacheManager,
    pub metrics: ApiMetrics,
    pub start_time: std::time::Instant,
}

/// Prometheus metrics collected by the HTTP layer.
pub struct ApiMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub rate_limited_total: IntCounter,
}

impl ApiMetrics {
    /// Create the counters and register them against a fresh registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounter::with_opts(Opts::new(
            "scholarly_requests_total",
            "Total number of requests seen by the rate limiter",
        ))
        .expect("failed to create requests_total counter");

        let rate_limited_total = IntCounter::with_opts(Opts::new(
            "scholarly_rate_limited_total",
            "Total number of requests rejected by the rate limiter",
        ))
        .expect("failed to create rate_limited_total counter");

        registry
            .register(Box::new(requests_total.clone()))
            .expect("failed to register requests_total");
        registry
            .register(Box::new(rate_limited_total.clone()))
            .expect("failed to register rate_limited_total");

        Self {
            registry,
            requests_total,
            rate_limited_total,
        }
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new(config: AppConfig, rate_limiter: RateLimiter, cache: CacheManager) -> Self {
        Self {
            config,
            rate_limiter,
            cache,
            metrics: ApiMetrics::new(),
            start_time: std::time::Instant::now(),
        }
    }
}
