use std::sync::Arc;
use std::time::Duration;

use scholarly_common::CacheConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::backend::{BackendKind, CacheBackend};
use crate::memory::MemoryBackend;
use crate::paper::PaperCache;
use crate::remote::RedisBackend;
use crate::search::SearchCache;

/// Default expiries applied by the manager's helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Used by the memoization adapters when no TTL is given.
    pub default: Duration,
    pub paper: Duration,
    pub search: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(60 * 60),
            paper: Duration::from_secs(24 * 60 * 60),
            search: Duration::from_secs(30 * 60),
        }
    }
}

impl From<&CacheConfig> for CacheTtls {
    fn from(config: &CacheConfig) -> Self {
        Self {
            default: config.default_ttl(),
            paper: config.paper_ttl(),
            search: config.search_ttl(),
        }
    }
}

/// Unified cache facade over the backend chosen at startup.
///
/// Construct one per process and hand clones to consumers; clones share the
/// same backend.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<CacheManagerInner>,
}

struct CacheManagerInner {
    backend: Backend,
    ttls: CacheTtls,
}

enum Backend {
    Memory(MemoryBackend),
    Redis(RedisBackend),
}

impl CacheManager {
    /// A manager backed purely by process memory.
    pub fn in_memory() -> Self {
        Self::with_memory(CacheTtls::default())
    }

    fn with_memory(ttls: CacheTtls) -> Self {
        Self::from_parts(Backend::Memory(MemoryBackend::new()), ttls)
    }

    fn from_parts(backend: Backend, ttls: CacheTtls) -> Self {
        Self {
            inner: Arc::new(CacheManagerInner { backend, ttls }),
        }
    }

    /// Select a backend from configuration.
    ///
    /// Redis is used when it is enabled, has a URL and answers within the
    /// connect timeout. Anything else degrades to the memory backend with a
    /// warning; this never fails.
    pub async fn connect(config: &CacheConfig) -> Self {
        let ttls = CacheTtls::from(config);

        let Some(url) = config.remote_url() else {
            if config.redis_enabled {
                tracing::warn!("redis cache enabled without a URL, using in-memory cache");
            } else {
                tracing::info!("using in-memory cache backend");
            }
            return Self::with_memory(ttls);
        };

        match RedisBackend::connect(url, config.connect_timeout(), config.operation_timeout())
            .await
        {
            Ok(backend) => {
                tracing::info!("using redis cache backend");
                Self::from_parts(Backend::Redis(backend), ttls)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "failed to connect to redis, falling back to in-memory cache"
                );
                Self::with_memory(ttls)
            }
        }
    }

    fn backend(&self) -> &dyn CacheBackend {
        match &self.inner.backend {
            Backend::Memory(backend) => backend,
            Backend::Redis(backend) => backend,
        }
    }

    pub fn backend_type(&self) -> BackendKind {
        self.backend().kind()
    }

    pub fn ttls(&self) -> CacheTtls {
        self.inner.ttls
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let value = self.backend().get(key).await;
        tracing::trace!(key, hit = value.is_some(), "cache lookup");
        value
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        self.backend().set(key, value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.backend().delete(key).await
    }

    pub async fn clear(&self) -> bool {
        self.backend().clear().await
    }

    pub async fn close(&self) {
        self.backend().close().await
    }

    /// Typed read. A stored value that does not deserialize into `T` is
    /// treated as a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::warn!(key, error = %e, "cached value has unexpected shape");
                None
            }
        }
    }

    /// Typed write. Values that cannot be represented as JSON are not stored.
    pub async fn set_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl).await,
            Err(e) => {
                tracing::warn!(key, error = %e, "value is not cacheable");
                false
            }
        }
    }

    pub fn paper_cache(&self) -> PaperCache {
        PaperCache::new(self.clone())
    }

    pub fn search_cache(&self) -> SearchCache {
        SearchCache::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Paper {
        title: String,
        year: u16,
    }

    #[tokio::test]
    async fn disabled_remote_uses_memory() {
        let config = CacheConfig {
            redis_url: Some("redis://127.0.0.1:6379".to_string()),
            ..CacheConfig::default()
        };
        let cache = CacheManager::connect(&config).await;
        assert_eq!(cache.backend_type(), BackendKind::Memory);
    }

    #[tokio::test]
    async fn enabled_without_url_uses_memory() {
        let config = CacheConfig {
            redis_enabled: true,
            ..CacheConfig::default()
        };
        let cache = CacheManager::connect(&config).await;
        assert_eq!(cache.backend_type(), BackendKind::Memory);
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let cache = CacheManager::in_memory();
        let paper = Paper {
            title: "BERT".to_string(),
            year: 2018,
        };

        assert!(cache.set_as("p", &paper, None).await);
        assert_eq!(cache.get_as::<Paper>("p").await, Some(paper));
    }

    #[tokio::test]
    async fn mismatched_shape_is_a_miss() {
        let cache = CacheManager::in_memory();
        cache.set("p", json!("just a string"), None).await;
        assert_eq!(cache.get_as::<Paper>("p").await, None);
        assert_eq!(cache.get("p").await, Some(json!("just a string")));
    }

    #[tokio::test]
    async fn clones_share_backend() {
        let cache = CacheManager::in_memory();
        let other = cache.clone();

        cache.set("k", json!(1), None).await;
        assert_eq!(other.get("k").await, Some(json!(1)));
        assert!(other.clear().await);
        assert_eq!(cache.get("k").await, None);
    }

    #[test]
    fn ttls_follow_config() {
        let config = CacheConfig {
            paper_ttl_secs: 10,
            search_ttl_secs: 20,
            default_ttl_secs: 30,
            ..CacheConfig::default()
        };
        let ttls = CacheTtls::from(&config);
        assert_eq!(ttls.paper, Duration::from_secs(10));
        assert_eq!(ttls.search, Duration::from_secs(20));
        assert_eq!(ttls.default, Duration::from_secs(30));
        assert_eq!(CacheTtls::from(&CacheConfig::default()), CacheTtls::default());
    }
}
