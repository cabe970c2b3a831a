use std::collections::BTreeMap;

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use scholarly_admin::{build_admin_router, build_api_router, new_shared_state, SharedStateType};
use scholarly_cache::CacheManager;
use scholarly_common::{AppConfig, EndpointLimit};
use scholarly_rate_limit::RateLimiter;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.rate_limit.endpoints = BTreeMap::new();
    config
        .rate_limit
        .endpoints
        .insert("/api/health".to_string(), EndpointLimit::new(2, 60));
    config
}

fn state_from(config: AppConfig) -> SharedStateType {
    let limiter = RateLimiter::from_config(&config.rate_limit);
    new_shared_state(config, limiter, CacheManager::in_memory())
}

fn test_state() -> SharedStateType {
    state_from(test_config())
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

#[tokio::test]
async fn test_health_reports_memory_backend() {
    let app = build_api_router(test_state());

    let (status, headers, body) = send(&app, "GET", "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache_backend"], "memory");
    assert_eq!(headers["x-ratelimit-limit"], "2");
    assert_eq!(headers["x-ratelimit-remaining"], "1");
}

#[tokio::test]
async fn test_rejection_carries_retry_after() {
    let app = build_api_router(test_state());

    send(&app, "GET", "/api/health", None).await;
    send(&app, "GET", "/api/health", None).await;
    let (status, headers, body) = send(&app, "GET", "/api/health", None).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Rate limit exceeded");
    assert_eq!(body["retry_after"], 30);
    assert_eq!(headers["retry-after"], "30");
    assert_eq!(body["message"], "Too many requests. Please wait 30 seconds.");
}

#[tokio::test]
async fn test_authorization_header_gets_its_own_bucket() {
    let app = build_api_router(test_state());

    send(&app, "GET", "/api/health", None).await;
    send(&app, "GET", "/api/health", None).await;

    let (status, _, _) = send(&app, "GET", "/api/health", Some("Bearer token-for-alice")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_user_quota_rejects_before_endpoint_limit() {
    let mut config = test_config();
    config
        .rate_limit
        .endpoints
        .insert("/api/health".to_string(), EndpointLimit::new(10, 60));
    config.rate_limit.user_quota = Some(EndpointLimit::new(2, 3600));
    let state = state_from(config);
    let app = build_api_router(state.clone());
    let token = Some("Bearer token-for-bob");

    for _ in 0..2 {
        let (status, _, _) = send(&app, "GET", "/api/health", token).await;
        assert_eq!(status, StatusCode::OK);
    }

    // The endpoint bucket still has tokens, the user quota does not.
    let (status, headers, body) = send(&app, "GET", "/api/health", token).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["retry_after"], 1800);
    assert_eq!(headers["retry-after"], "1800");

    let stats = state.rate_limiter.get_stats("Bearer token-for-bob");
    assert_eq!(stats.user_bucket.capacity, 2.0);
    assert!(stats.endpoints["/api/health"].remaining >= 7.0);

    // Requests without credentials only see the endpoint limit.
    let (status, _, _) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_operator_routes_are_not_public() {
    let state = state_from({
        let mut config = test_config();
        config
            .rate_limit
            .endpoints
            .insert("/api/health".to_string(), EndpointLimit::new(1, 3600));
        config
    });
    let app = build_api_router(state.clone());
    state.cache.set("k", json!(1), None).await;

    let (status, _, _) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    for (method, uri) in [
        ("DELETE", "/api/rate-limit"),
        ("DELETE", "/api/rate-limit/ip_unknown"),
        ("GET", "/api/rate-limit/ip_unknown"),
        ("DELETE", "/api/cache"),
        ("GET", "/api/metrics"),
    ] {
        let (status, _, _) = send(&app, method, uri, None).await;
        assert_ne!(status, StatusCode::OK, "{} {}", method, uri);
    }

    // Still throttled, and nothing was cleared.
    let (status, _, _) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(state.cache.get("k").await, Some(json!(1)));
    assert!(!state.rate_limiter.get_stats("ip_unknown").endpoints.is_empty());
}

#[tokio::test]
async fn test_admin_router_is_not_rate_limited() {
    let app = build_admin_router(test_state());

    for _ in 0..5 {
        let (status, headers, _) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn test_stats_and_reset() {
    let state = test_state();
    let api = build_api_router(state.clone());
    let admin = build_admin_router(state.clone());

    send(&api, "GET", "/api/health", Some("user-42")).await;

    let (status, _, stats) = send(&admin, "GET", "/api/rate-limit/user-42", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["endpoints"]["/api/health"]["capacity"], 2.0);
    assert_eq!(stats["user_bucket"]["capacity"], 0.0);

    let (status, _, body) = send(&admin, "DELETE", "/api/rate-limit/user-42", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identifier"], "user-42");
    assert!(state.rate_limiter.get_stats("user-42").endpoints.is_empty());

    send(&api, "GET", "/api/health", None).await;
    let (status, _, _) = send(&admin, "DELETE", "/api/rate-limit", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(state.rate_limiter.get_stats("ip_unknown").endpoints.is_empty());
}

#[tokio::test]
async fn test_clear_cache() {
    let state = test_state();
    let admin = build_admin_router(state.clone());
    state.cache.set("k", json!(1), None).await;

    let (status, _, body) = send(&admin, "DELETE", "/api/cache", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cleared");
    assert_eq!(state.cache.get("k").await, None);
}

#[tokio::test]
async fn test_metrics_count_rejections() {
    let state = test_state();
    let api = build_api_router(state.clone());
    let admin = build_admin_router(state);

    for _ in 0..3 {
        send(&api, "GET", "/api/health", None).await;
    }

    let response = admin
        .oneshot(Request::get("/api/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("scholarly_rate_limited_total 1"));
    assert!(text.contains("scholarly_requests_total 3"));
}

#[tokio::test]
async fn test_disabled_limiter_passes_through() {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = false;
    let app = build_api_router(state_from(config));

    let (status, headers, _) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("x-ratelimit-limit").is_none());
}
