use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::backend::{effective_ttl, BackendKind, CacheBackend};

struct MemoryEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache backend for development and as the fallback when Redis
/// is unavailable.
///
/// Expiry is lazy: an expired entry is only removed when a read touches it,
/// or by [`clear`](MemoryBackend::clear). Keys that expire and are never read
/// again keep their memory until then.
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();

        match self.entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }

        // Re-check under the write lock so a concurrent fresh `set` survives.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            tracing::trace!(key, "evicted expired cache entry");
        }
        None
    }

    /// Store `value` under `key`. A TTL too large to represent as a deadline
    /// is treated as no expiry.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        let expires_at = effective_ttl(ttl).and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        true
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key);
        true
    }

    pub fn clear(&self) -> bool {
        self.entries.clear();
        true
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Option<Value> {
        MemoryBackend::get(self, key)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        MemoryBackend::set(self, key, value, ttl)
    }

    async fn delete(&self, key: &str) -> bool {
        MemoryBackend::delete(self, key)
    }

    async fn clear(&self) -> bool {
        MemoryBackend::clear(self)
    }

    async fn close(&self) {}

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}
