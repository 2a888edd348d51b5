//! The interception dispatcher and its lifecycle.
//!
//! [`ServiceWorker::handle_fetch`] is invoked once per outbound request: it
//! classifies the request, runs the selected strategy and returns the
//! result as the substitute response. Before the worker has been installed
//! and activated it does not control any client, so requests go straight to
//! the network.

use crate::cache::CacheNamespace;
use crate::classifier::{Assignment, Classifier};
use crate::config::{CacheNames, WorkerConfig};
use crate::error::{Result, VerdantError};
use crate::http::{parse_url, Request, Response};
use crate::network::Fetcher;
use crate::strategy::StrategyExecutor;
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Installation failed; the worker never controls clients.
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    /// Cache the pre-cache list was written to.
    pub cache_name: String,
    /// Number of entries stored.
    pub cached: usize,
}

/// Outcome of the activation sweep.
#[derive(Debug, Clone, Serialize)]
pub struct ActivationReport {
    /// Caches removed because they are not in the current set.
    pub deleted: Vec<String>,
    /// Caches present after the sweep.
    pub remaining: Vec<String>,
}

/// Classifies and serves intercepted requests.
pub struct ServiceWorker {
    config: WorkerConfig,
    names: CacheNames,
    origin: Option<Url>,
    classifier: Classifier,
    executor: StrategyExecutor,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    controlling: AtomicBool,
}

impl ServiceWorker {
    /// Assemble a worker. Prefer [`ServiceWorker::builder`].
    pub fn new(
        config: WorkerConfig,
        namespace: CacheNamespace,
        fetcher: std::sync::Arc<dyn Fetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let origin = config.origin.as_deref().map(parse_url).transpose()?;
        let names = config.cache_names();
        let classifier = Classifier::new(&config);
        let executor = StrategyExecutor::new(namespace, fetcher, names.static_cache.clone());

        Ok(Self {
            config,
            names,
            origin,
            classifier,
            executor,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            controlling: AtomicBool::new(false),
        })
    }

    /// Create a builder for configuring storage and network access.
    pub fn builder(config: WorkerConfig) -> crate::builder::ServiceWorkerBuilder {
        crate::builder::ServiceWorkerBuilder::new(config)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn cache_names(&self) -> &CacheNames {
        &self.names
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn namespace(&self) -> &CacheNamespace {
        self.executor.namespace()
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Whether install asked to activate without waiting.
    pub fn is_waiting_skipped(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Whether the worker intercepts requests.
    pub fn is_controlling(&self) -> bool {
        self.controlling.load(Ordering::SeqCst)
    }

    /// Classify a request without serving it.
    pub fn classify(&self, request: &Request) -> Assignment {
        self.classifier.classify(request)
    }

    /// Serve one intercepted request.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response> {
        if !self.is_controlling() {
            debug!("Not controlling clients, passing {} through", request.url());
            return self.executor.fetcher().fetch(request).await;
        }

        let assignment = self.classifier.classify(request);
        let cache_name = assignment.cache_name(&self.names);
        debug!(
            "{} {} -> {} via {} ({})",
            request.method(),
            request.url(),
            cache_name,
            assignment.strategy,
            self.classifier.matching_rule(request)
        );

        match self
            .executor
            .execute(assignment.strategy, request, cache_name)
            .await
        {
            Err(err) if request.is_navigation() => {
                warn!("No response for navigation to {}: {}", request.url(), err);
                Ok(self.executor.offline_fallback(request))
            }
            result => result,
        }
    }

    /// Pre-populate the static cache and ask to activate immediately.
    ///
    /// All-or-nothing: if any pre-cache fetch fails or returns a non-success
    /// status, nothing is stored and the worker becomes redundant.
    pub async fn install(&self) -> Result<InstallReport> {
        self.transition("install", WorkerState::Parsed, WorkerState::Installing)
            .await?;

        match self.precache().await {
            Ok(report) => {
                self.skip_waiting();
                *self.state.write().await = WorkerState::Installed;
                info!(
                    "Installed: {} entries in '{}'",
                    report.cached, report.cache_name
                );
                Ok(report)
            }
            Err(err) => {
                *self.state.write().await = WorkerState::Redundant;
                warn!("Installation failed: {}", err);
                Err(match err {
                    VerdantError::InstallationFailed { .. } => err,
                    other => VerdantError::InstallationFailed {
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    async fn precache(&self) -> Result<InstallReport> {
        let requests = self
            .config
            .precache
            .iter()
            .map(|path| self.resolve(path))
            .collect::<Result<Vec<_>>>()?;

        let fetcher = self.executor.fetcher();
        let entries = try_join_all(requests.into_iter().map(|request| async move {
            let response = fetcher.fetch(&request).await?;
            if !response.ok() {
                return Err(VerdantError::InstallationFailed {
                    message: format!("{} returned status {}", request.url(), response.status()),
                });
            }
            Ok((request, response))
        }))
        .await?;

        let cache = self.namespace().open(&self.names.static_cache)?;
        cache.put_all(&entries)?;

        Ok(InstallReport {
            cache_name: cache.name().to_string(),
            cached: entries.len(),
        })
    }

    fn resolve(&self, path: &str) -> Result<Request> {
        match &self.origin {
            Some(origin) => {
                let url = origin.join(path).map_err(|e| VerdantError::InvalidUrl {
                    url: path.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Request::new(reqwest::Method::GET, url))
            }
            None => Request::get(path).map_err(|_| VerdantError::Config {
                message: format!("No origin configured to resolve pre-cache path '{}'", path),
            }),
        }
    }

    fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    /// Delete every cache outside the current set, then take control of
    /// clients.
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.transition("activate", WorkerState::Installed, WorkerState::Activating)
            .await?;

        // A failed sweep leaves the worker installed so activation can be retried
        let (deleted, remaining) = match self.sweep() {
            Ok(swept) => swept,
            Err(err) => {
                *self.state.write().await = WorkerState::Installed;
                return Err(err);
            }
        };

        self.claim_clients();
        *self.state.write().await = WorkerState::Activated;
        info!(
            "Activated version {} (removed {} outdated caches)",
            self.config.version,
            deleted.len()
        );

        Ok(ActivationReport { deleted, remaining })
    }

    fn sweep(&self) -> Result<(Vec<String>, Vec<String>)> {
        let keep = self.names.current();
        let deleted = self.namespace().retain(&keep)?;
        let remaining = self.namespace().list_names()?;
        Ok((deleted, remaining))
    }

    fn claim_clients(&self) {
        self.controlling.store(true, Ordering::SeqCst);
    }

    /// Install then activate.
    pub async fn start(&self) -> Result<ActivationReport> {
        self.install().await?;
        self.activate().await
    }

    async fn transition(
        &self,
        action: &'static str,
        from: WorkerState,
        to: WorkerState,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(VerdantError::InvalidState {
                action,
                state: state.to_string(),
            });
        }
        *state = to;
        Ok(())
    }
}
