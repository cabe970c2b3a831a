use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failures inside a backend. These never cross the [`CacheBackend`]
/// contract; backends log them and report a miss or a failed write.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend connection is closed")]
    Closed,
}

/// Which backend a [`CacheManager`](crate::CacheManager) settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Redis,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Redis => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform storage contract shared by every cache backend.
///
/// Values are JSON documents. A `ttl` of `None` or zero stores the value
/// without expiry. None of these methods may fail loudly: communication
/// problems are logged and reported as `None` or `false`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live value. Missing, expired and unreadable entries all
    /// return `None`.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store `value`, replacing any previous entry and its expiry.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool;

    async fn delete(&self, key: &str) -> bool;

    /// Remove every entry.
    async fn clear(&self) -> bool;

    /// Release any connection held by the backend. Idempotent.
    async fn close(&self);

    fn kind(&self) -> BackendKind;
}

/// Normalize a caller-supplied TTL: zero means "no expiry".
pub(crate) fn effective_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|ttl| !ttl.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_means_no_expiry() {
        assert_eq!(effective_ttl(Some(Duration::ZERO)), None);
        assert_eq!(effective_ttl(None), None);
        assert_eq!(
            effective_ttl(Some(Duration::from_millis(10))),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn backend_kind_names() {
        assert_eq!(BackendKind::Memory.to_string(), "memory");
        assert_eq!(
            serde_json::to_value(BackendKind::Redis).unwrap(),
            serde_json::json!("redis")
        );
    }
}
