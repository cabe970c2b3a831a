//! Key/value caching for the scholarly API.
//!
//! [`CacheManager`] is the single entry point. It picks a backend once, at
//! construction: Redis when enabled, configured and reachable, otherwise the
//! in-process [`MemoryBackend`]. Callers never learn which one is active
//! except through [`CacheManager::backend_type`].
//!
//! The cache is advisory. Backend failures are logged and surface as a miss
//! (`None`) or a failed write (`false`), never as an error, so every caller
//! must be able to recompute on a miss.
//!
//! Two read-through helpers sit on top of the manager:
//!
//! - [`PaperCache`] -- paper metadata keyed by `(source, identifier)`.
//! - [`SearchCache`] -- search results keyed by a digest of the query and
//!   its canonicalized filters.
//!
//! [`memoize_with`], [`memoize_async`] and [`try_memoize_async`] wrap arbitrary
//! computations with a cache lookup keyed by a [`MemoKey`].

pub mod backend;
pub mod manager;
pub mod memoize;
pub mod memory;
pub mod paper;
pub mod remote;
pub mod search;

pub use backend::{BackendKind, CacheBackend, CacheError};
pub use manager::{CacheManager, CacheTtls};
pub use memoize::{memoize_async, memoize_with, try_memoize_async, MemoKey};
pub use memory::MemoryBackend;
pub use paper::{paper_key, PaperCache};
pub use remote::RedisBackend;
pub use search::{search_key, SearchCache};
