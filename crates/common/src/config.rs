use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ScholarlyError, ScholarlyResult};

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Public, rate-limited API.
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            admin: AdminConfig::default(),
        }
    }
}

/// Operator API (stats, resets, cache maintenance, metrics). Bind it to an
/// address clients cannot reach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_listen")]
    pub listen: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen: default_admin_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Requests allowed per window for routes without an explicit limit.
    #[serde(default = "default_requests")]
    pub requests: u64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Per-route overrides keyed by exact request path.
    #[serde(default = "default_endpoint_limits")]
    pub endpoints: BTreeMap<String, EndpointLimit>,
    /// Endpoint-independent quota for authenticated callers, applied on top
    /// of the endpoint limits. Disabled when absent.
    #[serde(default)]
    pub user_quota: Option<EndpointLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: default_requests(),
            window_secs: default_window_secs(),
            endpoints: default_endpoint_limits(),
            user_quota: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLimit {
    pub capacity: u64,
    pub window_secs: u64,
}

impl EndpointLimit {
    pub const fn new(capacity: u64, window_secs: u64) -> Self {
        Self {
            capacity,
            window_secs,
        }
    }

    /// Tokens refilled per second.
    pub fn rate(&self) -> f64 {
        self.capacity as f64 / self.window_secs as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub redis_enabled: bool,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(default = "default_paper_ttl_secs")]
    pub paper_ttl_secs: u64,
    #[serde(default = "default_search_ttl_secs")]
    pub search_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_enabled: false,
            redis_url: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            default_ttl_secs: default_ttl_secs(),
            paper_ttl_secs: default_paper_ttl_secs(),
            search_ttl_secs: default_search_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn paper_ttl(&self) -> Duration {
        Duration::from_secs(self.paper_ttl_secs)
    }

    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    /// The Redis URL to connect to, if the remote cache is both enabled and
    /// configured.
    pub fn remote_url(&self) -> Option<&str> {
        if !self.redis_enabled {
            return None;
        }
        self.redis_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}

// Default value helpers
fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_admin_listen() -> String {
    "127.0.0.1:9090".to_string()
}
fn default_true() -> bool {
    true
}
fn default_requests() -> u64 {
    100
}
fn default_window_secs() -> u64 {
    60
}
fn default_connect_timeout_ms() -> u64 {
    2_000
}
fn default_operation_timeout_ms() -> u64 {
    500
}
fn default_ttl_secs() -> u64 {
    60 * 60
}
fn default_paper_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_search_ttl_secs() -> u64 {
    30 * 60
}
fn default_endpoint_limits() -> BTreeMap<String, EndpointLimit> {
    [
        ("/api/auth/login", EndpointLimit::new(10, 60)),
        ("/api/auth/signup", EndpointLimit::new(5, 300)),
        ("/api/chat/message", EndpointLimit::new(30, 60)),
        ("/api/files/upload", EndpointLimit::new(20, 300)),
        ("/api/search", EndpointLimit::new(60, 60)),
    ]
    .into_iter()
    .map(|(path, limit)| (path.to_string(), limit))
    .collect()
}

/// Upper bound accepted for any configured cache TTL (one year).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

pub const ENV_REDIS_URL: &str = "SCHOLARLY_REDIS_URL";
pub const ENV_REDIS_ENABLED: &str = "SCHOLARLY_REDIS_ENABLED";
pub const ENV_RATE_LIMIT_REQUESTS: &str = "SCHOLARLY_RATE_LIMIT_REQUESTS";
pub const ENV_RATE_LIMIT_WINDOW_SECS: &str = "SCHOLARLY_RATE_LIMIT_WINDOW_SECS";

impl AppConfig {
    /// Load configuration from a YAML file, apply environment overrides and
    /// validate the result.
    pub fn load(path: impl AsRef<Path>) -> ScholarlyResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_yaml::from_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SCHOLARLY_*` overrides looked up through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ScholarlyResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_REDIS_URL) {
            self.cache.redis_url = Some(url);
        }
        if let Some(raw) = lookup(ENV_REDIS_ENABLED) {
            self.cache.redis_enabled = parse_bool(ENV_REDIS_ENABLED, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RATE_LIMIT_REQUESTS) {
            self.rate_limit.requests = parse_u64(ENV_RATE_LIMIT_REQUESTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RATE_LIMIT_WINDOW_SECS) {
            self.rate_limit.window_secs = parse_u64(ENV_RATE_LIMIT_WINDOW_SECS, &raw)?;
        }
        Ok(())
    }

    /// Validate the configuration for consistency.
    ///
    /// A missing or unreachable Redis URL is deliberately not checked here:
    /// the cache degrades to memory at startup instead.
    pub fn validate(&self) -> ScholarlyResult<()> {
        if self.server.listen.trim().is_empty() {
            return Err(ScholarlyError::Config(
                "server.listen must not be empty".to_string(),
            ));
        }

        if self.rate_limit.requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(ScholarlyError::Config(format!(
                "rate_limit requires requests > 0 and window_secs > 0 (got {}/{})",
                self.rate_limit.requests, self.rate_limit.window_secs
            )));
        }

        for (path, limit) in &self.rate_limit.endpoints {
            if limit.capacity == 0 || limit.window_secs == 0 {
                return Err(ScholarlyError::Config(format!(
                    "endpoint '{}' requires capacity > 0 and window_secs > 0",
                    path
                )));
            }
        }

        if let Some(quota) = &self.rate_limit.user_quota {
            if quota.capacity == 0 || quota.window_secs == 0 {
                return Err(ScholarlyError::Config(
                    "rate_limit.user_quota requires capacity > 0 and window_secs > 0".to_string(),
                ));
            }
        }

        for (name, secs) in [
            ("default_ttl_secs", self.cache.default_ttl_secs),
            ("paper_ttl_secs", self.cache.paper_ttl_secs),
            ("search_ttl_secs", self.cache.search_ttl_secs),
        ] {
            if secs > MAX_TTL_SECS {
                return Err(ScholarlyError::Config(format!(
                    "cache.{} must be at most {} (got {})",
                    name, MAX_TTL_SECS, secs
                )));
            }
        }

        if self.server.admin.listen.trim() == self.server.listen.trim() {
            return Err(ScholarlyError::Config(format!(
                "server.admin.listen must differ from server.listen ({})",
                self.server.listen
            )));
        }

        Ok(())
    }
}

fn parse_bool(key: &str, raw: &str) -> ScholarlyResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ScholarlyError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_u64(key: &str, raw: &str) -> ScholarlyResult<u64> {
    raw.trim().parse::<u64>().map_err(|e| {
        ScholarlyError::Config(format!("{} must be an unsigned integer: {}", key, e))
    })
}
