//! Named response caches.
//!
//! A namespace holds any number of named caches, each mapping a request
//! identity to one stored response. All caches share a single SQLite
//! database so they survive restarts.

mod namespace;
mod sqlite;
mod traits;

pub use namespace::{CacheHandle, CacheNamespace};
pub use sqlite::SqliteCacheStorage;
pub use traits::{CacheEntry, CacheMeta, CacheStats, CacheStorage};
