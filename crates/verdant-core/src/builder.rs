//! Builder for configuring ServiceWorker initialization.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheNamespace, CacheStorage, SqliteCacheStorage};
use crate::config::{NetworkConfig, WorkerConfig};
use crate::error::{Result, VerdantError};
use crate::network::{Fetcher, HttpFetcher};
use crate::worker::ServiceWorker;

/// Builder for configuring ServiceWorker initialization.
///
/// # Example
///
/// ```rust,ignore
/// use verdant_core::{ServiceWorker, WorkerConfig};
///
/// let worker = ServiceWorker::builder(WorkerConfig::default())
///     .with_storage_path("./caches.sqlite")
///     .build()?;
/// worker.start().await?;
/// ```
pub struct ServiceWorkerBuilder {
    config: WorkerConfig,
    storage_path: Option<PathBuf>,
    storage: Option<Arc<dyn CacheStorage>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    timeout: Duration,
}

impl ServiceWorkerBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            storage_path: None,
            storage: None,
            fetcher: None,
            timeout: NetworkConfig::REQUEST_TIMEOUT,
        }
    }

    /// Persist caches in a SQLite database at `path`.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Use an existing storage backend. Takes precedence over a storage path.
    pub fn with_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use a custom network fetcher instead of the reqwest client.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Per-request timeout for the default fetcher.
    ///
    /// Default: [`NetworkConfig::REQUEST_TIMEOUT`]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the worker. It starts in the `Parsed` state.
    pub fn build(self) -> Result<ServiceWorker> {
        let storage: Arc<dyn CacheStorage> = match (self.storage, self.storage_path) {
            (Some(storage), _) => storage,
            (None, Some(path)) => Arc::new(SqliteCacheStorage::open(&path)?),
            (None, None) => {
                return Err(VerdantError::Config {
                    message: "No cache storage configured".to_string(),
                })
            }
        };

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::with_timeout(self.timeout)?),
        };

        ServiceWorker::new(self.config, CacheNamespace::new(storage), fetcher)
    }
}
