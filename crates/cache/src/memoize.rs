//! Read-through memoization on top of [`CacheManager`].
//!
//! The adapters differ only in how the value is produced: [`memoize_with`]
//! runs a plain closure, [`memoize_async`] awaits a future, and
//! [`try_memoize_async`] awaits a fallible future and caches only successes.
//! All three share [`MemoKey`] for key derivation.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::manager::CacheManager;

/// Deterministic cache key for one call: optional prefix, function name,
/// positional arguments in order, then keyword arguments sorted by name,
/// all joined with `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoKey {
    prefix: Option<String>,
    function: String,
    args: Vec<String>,
    kwargs: BTreeMap<String, String>,
}

impl MemoKey {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            prefix: None,
            function: function.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn arg(mut self, value: impl Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.kwargs.insert(name.into(), value.to_string());
        self
    }

    pub fn build(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(2 + self.args.len() + self.kwargs.len());
        if let Some(prefix) = &self.prefix {
            parts.push(prefix.clone());
        }
        parts.push(self.function.clone());
        parts.extend(self.args.iter().cloned());
        parts.extend(self.kwargs.iter().map(|(k, v)| format!("{}={}", k, v)));
        parts.join(":")
    }
}

/// Return the cached value for `key`, or run the synchronous `compute` and
/// cache its result.
///
/// The call itself must be awaited since the cache lookup may go over the
/// network. `ttl` defaults to the manager's default TTL.
pub async fn memoize_with<T, F>(
    cache: &CacheManager,
    key: &MemoKey,
    ttl: Option<Duration>,
    compute: F,
) -> T
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    let key = key.build();
    if let Some(hit) = cache.get_as::<T>(&key).await {
        return hit;
    }

    let value = compute();
    store(cache, &key, &value, ttl).await;
    value
}

/// Async counterpart of [`memoize_with`]: `compute` is only called, and its
/// future only awaited, on a miss.
pub async fn memoize_async<T, F, Fut>(
    cache: &CacheManager,
    key: &MemoKey,
    ttl: Option<Duration>,
    compute: F,
) -> T
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let key = key.build();
    if let Some(hit) = cache.get_as::<T>(&key).await {
        return hit;
    }

    let value = compute().await;
    store(cache, &key, &value, ttl).await;
    value
}

/// Like [`memoize_async`] for fallible work. Errors are returned to the
/// caller and never cached.
pub async fn try_memoize_async<T, E, F, Fut>(
    cache: &CacheManager,
    key: &MemoKey,
    ttl: Option<Duration>,
    compute: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let key = key.build();
    if let Some(hit) = cache.get_as::<T>(&key).await {
        return Ok(hit);
    }

    let value = compute().await?;
    store(cache, &key, &value, ttl).await;
    Ok(value)
}

async fn store<T: Serialize>(cache: &CacheManager, key: &str, value: &T, ttl: Option<Duration>) {
    let ttl = ttl.unwrap_or(cache.ttls().default);
    if !cache.set_as(key, value, Some(ttl)).await {
        tracing::debug!(key, "memoized value was not cached");
    }
}
