use std::time::Duration;

use serde_json::Value;

use crate::manager::CacheManager;

/// Cache key for one paper's metadata.
///
/// `%` and `:` in the source are percent-escaped so the first `:` after the
/// prefix always ends the source, and two different `(source, identifier)`
/// pairs never share a key.
pub fn paper_key(source: &str, identifier: &str) -> String {
    let mut key = String::with_capacity(7 + source.len() + identifier.len());
    key.push_str("paper:");
    for ch in source.chars() {
        match ch {
            '%' => key.push_str("%25"),
            ':' => key.push_str("%3A"),
            other => key.push(other),
        }
    }
    key.push(':');
    key.push_str(identifier);
    key
}

/// Paper metadata cache, keyed by `(source, identifier)` such as
/// `("arxiv", "2301.07041")`. Entries expire after the configured paper TTL
/// (24 hours by default).
#[derive(Clone)]
pub struct PaperCache {
    cache: CacheManager,
    ttl: Duration,
}

impl PaperCache {
    pub fn new(cache: CacheManager) -> Self {
        let ttl = cache.ttls().paper;
        Self { cache, ttl }
    }

    pub async fn get_metadata(&self, source: &str, identifier: &str) -> Option<Value> {
        self.cache.get(&paper_key(source, identifier)).await
    }

    pub async fn set_metadata(&self, source: &str, identifier: &str, metadata: Value) -> bool {
        self.set_metadata_with_ttl(source, identifier, metadata, Some(self.ttl))
            .await
    }

    pub async fn set_metadata_with_ttl(
        &self,
        source: &str,
        identifier: &str,
        metadata: Value,
        ttl: Option<Duration>,
    ) -> bool {
        self.cache
            .set(&paper_key(source, identifier), metadata, ttl)
            .await
    }

    pub async fn invalidate(&self, source: &str, identifier: &str) -> bool {
        self.cache.delete(&paper_key(source, identifier)).await
    }
}
