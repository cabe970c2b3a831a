//! Rate limiting for the scholarly API.
//!
//! The limiter keeps one [`TokenBucket`] per `(identifier, endpoint)` pair,
//! where the identifier is a user id or client address, plus a separate
//! endpoint-independent bucket per identifier for coarse per-user throttling.
//!
//! Exceeding a limit is not an error: [`RateLimiter::check_rate_limit`]
//! returns a [`RateLimitDecision`] and the HTTP layer decides how to reject.
//!
//! Buckets live in [`DashMap`](dashmap::DashMap) registries. Get-or-create
//! happens under the registry's entry lock, so concurrent first requests for
//! the same pair always share one bucket.

pub mod token_bucket;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use scholarly_common::{EndpointLimit, RateLimitConfig};
use serde::Serialize;

pub use token_bucket::TokenBucket;

/// Ceiling for advertised retry delays. A bucket that never refills would
/// otherwise report an unbounded wait.
pub const MAX_RETRY_AFTER_SECS: u64 = 24 * 60 * 60;

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Tokens left after this request; zero when denied.
    pub remaining: f64,
    /// Estimated seconds until a token frees up; zero when allowed.
    ///
    /// This is a heuristic: concurrent callers may still race for the token.
    pub wait_secs: f64,
}

impl RateLimitDecision {
    /// Whole seconds a rejected client should wait, rounded up so that a
    /// client honoring it does not retry before a token is available.
    /// Capped at [`MAX_RETRY_AFTER_SECS`].
    pub fn retry_after_secs(&self) -> u64 {
        if self.allowed || self.wait_secs <= 0.0 {
            0
        } else if self.wait_secs >= MAX_RETRY_AFTER_SECS as f64 {
            MAX_RETRY_AFTER_SECS
        } else {
            self.wait_secs.ceil() as u64
        }
    }
}

/// Remaining tokens and capacity of one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BucketStats {
    pub remaining: f64,
    pub capacity: f64,
}

impl BucketStats {
    fn of(bucket: &TokenBucket) -> Self {
        Self {
            remaining: bucket.remaining(),
            capacity: bucket.capacity(),
        }
    }
}

/// Snapshot of every bucket held for one identifier.
///
/// `user_bucket` is all zeros if the identifier never used a per-user bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub user_bucket: BucketStats,
    pub endpoints: BTreeMap<String, BucketStats>,
}

/// Token bucket rate limiter keyed by identifier and endpoint.
///
/// Cheaply cloneable (backed by `Arc`); clones share all buckets.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    default_capacity: f64,
    default_window_secs: f64,
    endpoint_limits: BTreeMap<String, EndpointLimit>,
    buckets: DashMap<String, HashMap<String, Arc<TokenBucket>>>,
    user_buckets: DashMap<String, Arc<TokenBucket>>,
}

impl RateLimiter {
    /// Create a limiter with a process-wide default of `requests` per
    /// `window_secs` and no per-endpoint overrides.
    ///
    /// # Panics
    ///
    /// Panics if either value is zero.
    pub fn new(requests: u64, window_secs: u64) -> Self {
        Self::with_endpoint_limits(requests, window_secs, BTreeMap::new())
    }

    /// Create a limiter with a default limit and a static table of per-path
    /// overrides.
    pub fn with_endpoint_limits(
        requests: u64,
        window_secs: u64,
        endpoint_limits: BTreeMap<String, EndpointLimit>,
    ) -> Self {
        assert!(requests > 0, "default rate limit requests must be positive");
        assert!(window_secs > 0, "default rate limit window must be positive");

        tracing::info!(
            requests,
            window_secs,
            endpoints = endpoint_limits.len(),
            "creating token bucket rate limiter"
        );

        Self {
            inner: Arc::new(RateLimiterInner {
                default_capacity: requests as f64,
                default_window_secs: window_secs as f64,
                endpoint_limits,
                buckets: DashMap::new(),
                user_buckets: DashMap::new(),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::with_endpoint_limits(
            config.requests,
            config.window_secs,
            config.endpoints.clone(),
        )
    }

    /// Consume one token for `identifier` on `endpoint`.
    ///
    /// `capacity` defaults to the configured request count and `rate` to
    /// `capacity / window`. The bucket for a pair is sized by the first call
    /// that creates it; later calls with different overrides reuse the
    /// existing bucket unchanged.
    pub fn check_rate_limit(
        &self,
        identifier: &str,
        endpoint: &str,
        capacity: Option<f64>,
        rate: Option<f64>,
    ) -> RateLimitDecision {
        let capacity = capacity.unwrap_or(self.inner.default_capacity);
        let rate = rate.unwrap_or(capacity / self.inner.default_window_secs);

        let bucket = self.endpoint_bucket(identifier, endpoint, capacity, rate);
        let decision = consume_one(&bucket);
        if !decision.allowed {
            tracing::debug!(
                identifier,
                endpoint,
                wait_secs = decision.wait_secs,
                "rate limit exceeded"
            );
        }
        decision
    }

    /// Consume one token from the endpoint-independent quota of
    /// `identifier`: `capacity` requests per `window_secs`.
    ///
    /// Shares its bucket with [`get_user_bucket`](Self::get_user_bucket), so
    /// the first caller sizes it. A zero window is treated as no refill.
    pub fn check_user(
        &self,
        identifier: &str,
        capacity: f64,
        window_secs: f64,
    ) -> RateLimitDecision {
        let rate = if window_secs > 0.0 {
            capacity / window_secs
        } else {
            0.0
        };
        let bucket = self.user_bucket(identifier, capacity, rate);
        let decision = consume_one(&bucket);
        if !decision.allowed {
            tracing::debug!(identifier, wait_secs = decision.wait_secs, "user quota exceeded");
        }
        decision
    }

    /// Check a request path against the endpoint table, falling back to the
    /// process default for unmapped paths.
    pub fn check_endpoint(&self, identifier: &str, path: &str) -> RateLimitDecision {
        match self.inner.endpoint_limits.get(path) {
            Some(limit) => self.check_rate_limit(
                identifier,
                path,
                Some(limit.capacity as f64),
                Some(limit.rate()),
            ),
            None => self.check_rate_limit(identifier, path, None, None),
        }
    }

    /// Capacity that applies to `path`, as advertised to clients.
    pub fn limit_for(&self, path: &str) -> u64 {
        self.inner
            .endpoint_limits
            .get(path)
            .map(|limit| limit.capacity)
            .unwrap_or(self.inner.default_capacity as u64)
    }

    /// Endpoint-independent bucket for `identifier`, created on first use
    /// with `capacity` tokens refilling over the default window.
    pub fn get_user_bucket(&self, identifier: &str, capacity: f64) -> Arc<TokenBucket> {
        self.user_bucket(identifier, capacity, capacity / self.inner.default_window_secs)
    }

    fn user_bucket(&self, identifier: &str, capacity: f64, rate: f64) -> Arc<TokenBucket> {
        let bucket = self
            .inner
            .user_buckets
            .entry(identifier.to_string())
            .or_insert_with(|| {
                tracing::debug!(identifier, capacity, "creating user bucket");
                Arc::new(TokenBucket::new(capacity, rate))
            });
        Arc::clone(bucket.value())
    }

    /// Drop the buckets of one identifier, or of everyone when `None`.
    pub fn reset(&self, identifier: Option<&str>) {
        match identifier {
            Some(id) => {
                self.inner.buckets.remove(id);
                self.inner.user_buckets.remove(id);
                tracing::info!(identifier = id, "rate limits reset");
            }
            None => {
                self.inner.buckets.clear();
                self.inner.user_buckets.clear();
                tracing::info!("all rate limits reset");
            }
        }
    }

    pub fn get_stats(&self, identifier: &str) -> RateLimitStats {
        let user_bucket = self
            .inner
            .user_buckets
            .get(identifier)
            .map(|bucket| BucketStats::of(bucket.value()))
            .unwrap_or_default();

        // Clone the handles out so the registry shard is not held while
        // each bucket's lock is taken.
        let buckets: Vec<(String, Arc<TokenBucket>)> = self
            .inner
            .buckets
            .get(identifier)
            .map(|endpoints| {
                endpoints
                    .iter()
                    .map(|(endpoint, bucket)| (endpoint.clone(), Arc::clone(bucket)))
                    .collect()
            })
            .unwrap_or_default();

        RateLimitStats {
            user_bucket,
            endpoints: buckets
                .into_iter()
                .map(|(endpoint, bucket)| (endpoint, BucketStats::of(&bucket)))
                .collect(),
        }
    }

    fn endpoint_bucket(
        &self,
        identifier: &str,
        endpoint: &str,
        capacity: f64,
        rate: f64,
    ) -> Arc<TokenBucket> {
        let mut endpoints = self
            .inner
            .buckets
            .entry(identifier.to_string())
            .or_default();

        if let Some(existing) = endpoints.get(endpoint) {
            if existing.capacity() != capacity || existing.rate() != rate {
                tracing::debug!(
                    identifier,
                    endpoint,
                    existing_capacity = existing.capacity(),
                    requested_capacity = capacity,
                    "keeping first bucket sizing for endpoint"
                );
            }
            return Arc::clone(existing);
        }

        let bucket = Arc::new(TokenBucket::new(capacity, rate));
        endpoints.insert(endpoint.to_string(), Arc::clone(&bucket));
        bucket
    }
}

fn consume_one(bucket: &TokenBucket) -> RateLimitDecision {
    if bucket.consume(1.0) {
        RateLimitDecision {
            allowed: true,
            remaining: bucket.remaining(),
            wait_secs: 0.0,
        }
    } else {
        let remaining = bucket.remaining();
        RateLimitDecision {
            allowed: false,
            remaining: 0.0,
            wait_secs: bucket.wait_time_for(remaining),
        }
    }
}
