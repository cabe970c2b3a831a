use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{AUTHORIZATION, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::SharedState;

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";

/// Characters of the `Authorization` header used as the identifier, so the
/// full credential never lands in the limiter's registry.
const AUTH_IDENTIFIER_CHARS: usize = 20;

/// Rate limiting middleware for the public API.
///
/// Requests are keyed by a truncated `Authorization` header when present,
/// otherwise by client address, and checked against the endpoint table.
/// Authenticated requests are also charged against the per-user quota when
/// one is configured. Rejections get a 429 with a JSON body and a
/// `Retry-After` header.
pub async fn rate_limit(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let config = &state.config.rate_limit;
    if !config.enabled {
        return next.run(request).await;
    }

    state.metrics.requests_total.inc();

    let path = request.uri().path().to_string();
    let user = authorization_identifier(request.headers());

    if let (Some(user), Some(quota)) = (user.as_deref(), config.user_quota) {
        let decision = state.rate_limiter.check_user(
            user,
            quota.capacity as f64,
            quota.window_secs as f64,
        );
        if !decision.allowed {
            return reject(&state, user, &path, decision.retry_after_secs());
        }
    }

    let identifier = user.unwrap_or_else(|| address_identifier(peer_addr(&request)));
    let decision = state.rate_limiter.check_endpoint(&identifier, &path);
    if !decision.allowed {
        return reject(&state, &identifier, &path, decision.retry_after_secs());
    }

    let limit = state.rate_limiter.limit_for(&path);
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        RATE_LIMIT_REMAINING,
        HeaderValue::from(decision.remaining.max(0.0) as u64),
    );
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));

    response
}

fn reject(state: &SharedState, identifier: &str, path: &str, retry_after: u64) -> Response {
    state.metrics.rate_limited_total.inc();
    tracing::info!(identifier, path, retry_after, "request rate limited");

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(RETRY_AFTER, HeaderValue::from(retry_after))],
        Json(json!({
            "error": "Rate limit exceeded",
            "message": format!("Too many requests. Please wait {} seconds.", retry_after),
            "retry_after": retry_after
        })),
    )
        .into_response()
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Rate limiting subject for a request.
pub fn client_identifier(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    authorization_identifier(headers).unwrap_or_else(|| address_identifier(peer))
}

fn authorization_identifier(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(|value| value.chars().take(AUTH_IDENTIFIER_CHARS).collect())
}

fn address_identifier(peer: Option<SocketAddr>) -> String {
    match peer {
        Some(addr) => format!("ip_{}", addr.ip()),
        None => "ip_unknown".to_string(),
    }
}
