use std::time::Duration;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::manager::CacheManager;

/// Cache key for a search: a SHA-256 digest of the query and its filters.
///
/// Filters are serialized canonically, with object keys sorted at every
/// depth, so logically equal filter sets produce the same key whatever
/// order they were built in.
pub fn search_key(query: &str, filters: &Map<String, Value>) -> String {
    let mut canonical = String::new();
    write_canonical_object(filters, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(b"search:");
    hasher.update(query.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(value, out);
    }
    out.push('}');
}

/// Search result cache. Entries expire after the configured search TTL
/// (30 minutes by default).
#[derive(Clone)]
pub struct SearchCache {
    cache: CacheManager,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(cache: CacheManager) -> Self {
        let ttl = cache.ttls().search;
        Self { cache, ttl }
    }

    pub async fn get_results(
        &self,
        query: &str,
        filters: &Map<String, Value>,
    ) -> Option<Vec<Value>> {
        self.cache.get_as(&search_key(query, filters)).await
    }

    pub async fn set_results(
        &self,
        query: &str,
        filters: &Map<String, Value>,
        results: &[Value],
    ) -> bool {
        self.set_results_with_ttl(query, filters, results, Some(self.ttl))
            .await
    }

    pub async fn set_results_with_ttl(
        &self,
        query: &str,
        filters: &Map<String, Value>,
        results: &[Value],
        ttl: Option<Duration>,
    ) -> bool {
        self.cache
            .set_as(&search_key(query, filters), results, ttl)
            .await
    }

    /// Always reports success without removing anything.
    ///
    /// Keys are digests, so the entries for one query cannot be found
    /// without the filters they were stored under. Stale results age out
    /// through the search TTL instead.
    pub async fn invalidate_query(&self, query: &str) -> bool {
        tracing::debug!(query, "search invalidation is a no-op, entries expire by TTL");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {}", other),
        }
    }

    #[test]
    fn key_ignores_filter_order() {
        let mut a = Map::new();
        a.insert("year".to_string(), json!(2020));
        a.insert("min_citations".to_string(), json!(10));

        let mut b = Map::new();
        b.insert("min_citations".to_string(), json!(10));
        b.insert("year".to_string(), json!(2020));

        assert_eq!(search_key("ml", &a), search_key("ml", &b));
    }

    #[test]
    fn nested_objects_are_canonicalized() {
        let a = filters(json!({
            "range": {"to": 2024, "from": 2020},
            "venue": ["ACL", "EMNLP"]
        }));
        let b = filters(json!({
            "venue": ["ACL", "EMNLP"],
            "range": {"from": 2020, "to": 2024}
        }));
        assert_eq!(search_key("nlp", &a), search_key("nlp", &b));

        // Array order is significant.
        let c = filters(json!({
            "venue": ["EMNLP", "ACL"],
            "range": {"from": 2020, "to": 2024}
        }));
        assert_ne!(search_key("nlp", &a), search_key("nlp", &c));
    }

    #[test]
    fn key_depends_on_query_and_values() {
        let f = filters(json!({"year": 2020}));
        assert_ne!(search_key("ml", &f), search_key("ai", &f));
        assert_ne!(
            search_key("ml", &f),
            search_key("ml", &filters(json!({"year": "2020"})))
        );

        let key = search_key("ml", &f);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn results_round_trip() {
        let searches = CacheManager::in_memory().search_cache();
        let f = filters(json!({"year": 2020, "min_citations": 10}));
        let results = vec![json!({"id": "p1"}), json!({"id": "p2"})];

        assert!(searches.set_results("ml", &f, &results).await);

        let reordered = filters(json!({"min_citations": 10, "year": 2020}));
        assert_eq!(searches.get_results("ml", &reordered).await, Some(results));
        assert_eq!(searches.get_results("ml", &Map::new()).await, None);
    }

    #[tokio::test]
    async fn invalidate_query_is_a_no_op() {
        let searches = CacheManager::in_memory().search_cache();
        let f = Map::new();
        searches.set_results("ml", &f, &[json!(1)]).await;

        assert!(searches.invalidate_query("ml").await);
        assert!(searches.get_results("ml", &f).await.is_some());
    }
}
