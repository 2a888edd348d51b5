//! Handle-based access to the cache namespace.

use super::traits::{CacheStats, CacheStorage};
use crate::error::Result;
use crate::http::{Request, Response};
use std::sync::Arc;
use tracing::info;

/// The set of named caches, backed by a shared [`CacheStorage`].
///
/// Cloning is cheap; every clone sees the same storage.
#[derive(Clone)]
pub struct CacheNamespace {
    storage: Arc<dyn CacheStorage>,
}

impl CacheNamespace {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    /// Open a named cache, creating it if absent.
    pub fn open(&self, name: &str) -> Result<CacheHandle> {
        self.storage.create(name)?;
        Ok(CacheHandle {
            name: name.to_string(),
            storage: Arc::clone(&self.storage),
        })
    }

    /// Scoped lookup that does not create the cache.
    pub fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        self.storage.match_in(name, request)
    }

    /// Unscoped lookup across every cache; newest write wins.
    pub fn match_any(&self, request: &Request) -> Result<Option<Response>> {
        self.storage.match_any(request)
    }

    pub fn has(&self, name: &str) -> Result<bool> {
        self.storage.has(name)
    }

    pub fn list_names(&self) -> Result<Vec<String>> {
        self.storage.list_names()
    }

    pub fn delete(&self, name: &str) -> Result<bool> {
        self.storage.delete(name)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        self.storage.stats()
    }

    /// Delete every cache whose name is not in `keep`.
    ///
    /// Returns the deleted names in sorted order.
    pub fn retain(&self, keep: &[&str]) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.storage.list_names()? {
            if keep.contains(&name.as_str()) {
                continue;
            }
            if self.storage.delete(&name)? {
                info!("Deleted outdated cache '{}'", name);
                deleted.push(name);
            }
        }
        Ok(deleted)
    }
}

/// An opened named cache.
#[derive(Clone)]
pub struct CacheHandle {
    name: String,
    storage: Arc<dyn CacheStorage>,
}

impl CacheHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        self.storage.match_in(&self.name, request)
    }

    /// Store a duplicate of `response` under the request identity.
    pub fn put(&self, request: &Request, response: &Response) -> Result<()> {
        self.storage.put(&self.name, request, response)
    }

    /// Store every entry or none of them.
    pub fn put_all(&self, entries: &[(Request, Response)]) -> Result<()> {
        self.storage.put_all(&self.name, entries)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.storage.keys(&self.name)
    }

    pub fn delete_entry(&self, request: &Request) -> Result<bool> {
        self.storage.delete_entry(&self.name, request)
    }
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle").field("name", &self.name).finish()
    }
}
