//! Cache storage trait and types.

use crate::error::Result;
use crate::http::{Request, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored response with its bookkeeping metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cache the entry lives in.
    pub cache_name: String,
    /// Request identity (`METHOD url`).
    pub request_key: String,
    /// The stored response.
    pub response: Response,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
    /// Size of the stored body in bytes.
    pub size_bytes: u64,
}

/// Metadata about one named cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Cache name.
    pub name: String,
    /// Number of entries in this cache.
    pub entry_count: usize,
    /// Total body size of all entries in bytes.
    pub total_size_bytes: u64,
    /// When the cache was first opened.
    pub created_at: Option<DateTime<Utc>>,
}

/// Statistics across the whole namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total number of entries across all caches.
    pub total_entries: usize,
    /// Total size of all stored bodies in bytes.
    pub total_size_bytes: u64,
    /// Per-cache statistics, ordered by name.
    pub caches: Vec<CacheMeta>,
}

/// Durable storage for a namespace of named caches.
///
/// Each cache maps a request identity to exactly one response; writing
/// replaces the prior entry. All operations are synchronous to match
/// rusqlite's API and are atomic at the single-entry level.
pub trait CacheStorage: Send + Sync {
    /// Create the named cache if it does not exist yet.
    fn create(&self, name: &str) -> Result<()>;

    /// Check whether a named cache exists.
    fn has(&self, name: &str) -> Result<bool>;

    /// Look up a request in one named cache.
    ///
    /// A missing cache is a miss, not an error.
    fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>>;

    /// Look up a request across every cache in the namespace.
    ///
    /// Returns the most recently written entry for the request identity.
    fn match_any(&self, request: &Request) -> Result<Option<Response>>;

    /// Look up a request in one cache, including entry metadata.
    fn entry(&self, name: &str, request: &Request) -> Result<Option<CacheEntry>>;

    /// Store a response under the request identity, replacing any prior entry.
    ///
    /// Creates the cache when absent. Fails with `NotCacheable` for
    /// responses whose success indicator is false.
    fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()>;

    /// Store several entries in one transaction: either all are written or
    /// none are.
    fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()>;

    /// Request identities stored in one cache, oldest write first.
    fn keys(&self, name: &str) -> Result<Vec<String>>;

    /// Remove one entry. Returns whether anything was removed.
    fn delete_entry(&self, name: &str, request: &Request) -> Result<bool>;

    /// Names of every cache in the namespace, sorted.
    fn list_names(&self) -> Result<Vec<String>>;

    /// Remove a named cache and all of its entries.
    ///
    /// Returns whether the cache existed.
    fn delete(&self, name: &str) -> Result<bool>;

    /// Namespace-wide statistics.
    fn stats(&self) -> Result<CacheStats>;
}
