//! Caching strategies.
//!
//! Every strategy shares one skeleton (look up, fetch, store, fall back) and
//! differs only in ordering and in what it does when the network fails:
//!
//! - **Cache-First** serves a hit without touching the network; on a miss it
//!   fetches and stores. A failed fetch for a document falls back to the
//!   cached root page or a synthesized `503 Offline`.
//! - **Network-First** always fetches first; a failed fetch falls back to the
//!   named cache, then to any cache in the namespace.
//! - **Stale-While-Revalidate** serves a hit immediately and refreshes the
//!   cache in a detached task; on a miss the caller waits for that task.
//!
//! Only successful responses to GET requests are stored. Cache writes are
//! best-effort: a failed write is logged and never fails the request.

use crate::cache::CacheNamespace;
use crate::error::{Result, VerdantError};
use crate::http::{Request, Response};
use crate::network::Fetcher;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// The three caching strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a network response may be written to a cache.
///
/// Partial content is excluded: storing a range would serve it as the whole
/// resource on every later hit.
pub fn is_cacheable(request: &Request, response: &Response) -> bool {
    *request.method() == Method::GET && response.ok() && !response.is_partial()
}

/// Runs strategies against a cache namespace and the network.
#[derive(Clone)]
pub struct StrategyExecutor {
    namespace: CacheNamespace,
    fetcher: Arc<dyn Fetcher>,
    static_cache: String,
}

impl StrategyExecutor {
    /// `static_cache` is where document fallbacks look for the root page.
    pub fn new(
        namespace: CacheNamespace,
        fetcher: Arc<dyn Fetcher>,
        static_cache: impl Into<String>,
    ) -> Self {
        Self {
            namespace,
            fetcher,
            static_cache: static_cache.into(),
        }
    }

    pub fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Produce a response for `request` using `strategy` against `cache_name`.
    pub async fn execute(
        &self,
        strategy: Strategy,
        request: &Request,
        cache_name: &str,
    ) -> Result<Response> {
        match strategy {
            Strategy::CacheFirst => self.cache_first(request, cache_name).await,
            Strategy::NetworkFirst => self.network_first(request, cache_name).await,
            Strategy::StaleWhileRevalidate => {
                self.stale_while_revalidate(request, cache_name).await
            }
        }
    }

    async fn cache_first(&self, request: &Request, cache_name: &str) -> Result<Response> {
        if let Some(cached) = lookup(&self.namespace, cache_name, request) {
            debug!("cache-first hit for {} in '{}'", request.url(), cache_name);
            return Ok(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                store(&self.namespace, cache_name, request, &response);
                Ok(response)
            }
            Err(err) if request.is_document() => {
                warn!("Fetch of {} failed, serving offline page: {}", request.url(), err);
                Ok(self.offline_fallback(request))
            }
            Err(err) => Err(err),
        }
    }

    async fn network_first(&self, request: &Request, cache_name: &str) -> Result<Response> {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                store(&self.namespace, cache_name, request, &response);
                Ok(response)
            }
            Err(err) => {
                if let Some(cached) = lookup(&self.namespace, cache_name, request) {
                    debug!("network-first fallback to '{}' for {}", cache_name, request.url());
                    return Ok(cached);
                }
                if let Some(cached) = lookup_any(&self.namespace, request) {
                    debug!("network-first fallback to namespace for {}", request.url());
                    return Ok(cached);
                }
                Err(err)
            }
        }
    }

    async fn stale_while_revalidate(&self, request: &Request, cache_name: &str) -> Result<Response> {
        let cached = lookup(&self.namespace, cache_name, request);
        let refresh = self.spawn_refresh(request.clone(), cache_name.to_string());

        match cached {
            Some(cached) => {
                debug!("stale-while-revalidate hit for {}", request.url());
                Ok(cached)
            }
            None => refresh
                .await
                .map_err(|e| VerdantError::Other(format!("Refresh task failed: {}", e)))?,
        }
    }

    /// Fetch in a detached task and store the result if it is cacheable.
    ///
    /// A failed fetch is logged at debug level; the caller only observes it
    /// when awaiting the handle.
    fn spawn_refresh(&self, request: Request, cache_name: String) -> JoinHandle<Result<Response>> {
        let namespace = self.namespace.clone();
        let fetcher = Arc::clone(&self.fetcher);

        tokio::spawn(async move {
            let result = fetcher.fetch(&request).await;
            match &result {
                Ok(response) => store(&namespace, &cache_name, &request, response),
                Err(err) => debug!("Background refresh of {} failed: {}", request.url(), err),
            }
            result
        })
    }

    /// The cached root page from the static cache, or a `503 Offline` page.
    pub fn offline_fallback(&self, request: &Request) -> Response {
        request
            .sibling("/")
            .ok()
            .and_then(|root| lookup(&self.namespace, &self.static_cache, &root))
            .unwrap_or_else(Response::offline)
    }
}

/// Scoped lookup; storage errors count as a miss.
fn lookup(namespace: &CacheNamespace, cache_name: &str, request: &Request) -> Option<Response> {
    match namespace.match_in(cache_name, request) {
        Ok(found) => found,
        Err(err) => {
            warn!("Cache lookup in '{}' failed: {}", cache_name, err);
            None
        }
    }
}

/// Unscoped lookup; storage errors count as a miss.
fn lookup_any(namespace: &CacheNamespace, request: &Request) -> Option<Response> {
    match namespace.match_any(request) {
        Ok(found) => found,
        Err(err) => {
            warn!("Namespace lookup failed: {}", err);
            None
        }
    }
}

/// Best-effort write of a duplicate of `response`.
fn store(namespace: &CacheNamespace, cache_name: &str, request: &Request, response: &Response) {
    if !is_cacheable(request, response) {
        debug!(
            "Not caching {} {} (status {})",
            request.method(),
            request.url(),
            response.status()
        );
        return;
    }

    let result = namespace
        .open(cache_name)
        .and_then(|cache| cache.put(request, response));
    if let Err(err) = result {
        warn!("Failed to store {} in '{}': {}", request.url(), cache_name, err);
    }
}
