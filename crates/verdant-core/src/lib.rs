//! Verdant Core - offline-first request caching engine.
//!
//! Intercepts outbound requests, classifies each one into a versioned named
//! cache and a caching strategy, and serves it from cache, network, or both.
//! Caches are stored in SQLite and survive restarts; the install and
//! activate lifecycle pre-populates the static cache and sweeps caches left
//! behind by older versions.
//!
//! # Example
//!
//! ```rust,ignore
//! use verdant_core::{Request, ServiceWorker, WorkerConfig};
//!
//! #[tokio::main]
//! async fn main() -> verdant_core::Result<()> {
//!     let config = WorkerConfig {
//!         origin: Some("http://localhost:4200".to_string()),
//!         ..WorkerConfig::default()
//!     };
//!     let worker = ServiceWorker::builder(config)
//!         .with_storage_path("/tmp/verdant/caches.sqlite")
//!         .build()?;
//!
//!     worker.start().await?;
//!
//!     let response = worker
//!         .handle_fetch(&Request::get("http://localhost:4200/styles.css")?)
//!         .await?;
//!     println!("{} ({} bytes)", response.status(), response.body().len());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod http;
pub mod network;
pub mod strategy;
pub mod worker;

mod builder;

// Re-export commonly used types
pub use builder::ServiceWorkerBuilder;
pub use cache::{CacheEntry, CacheHandle, CacheMeta, CacheNamespace, CacheStats, CacheStorage, SqliteCacheStorage};
pub use classifier::{Assignment, Classifier};
pub use config::{CacheNames, CacheRole, WorkerConfig};
pub use error::{Result, VerdantError};
pub use http::{Destination, Request, RequestMode, Response};
pub use network::{Fetcher, HttpFetcher};
pub use strategy::{Strategy, StrategyExecutor};
pub use worker::{ActivationReport, InstallReport, ServiceWorker, WorkerState};
