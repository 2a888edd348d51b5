//! HTTP fetcher backed by reqwest.
//!
//! Provides a wrapper around reqwest with:
//! - Configurable request and connect timeouts
//! - User-agent management
//! - Hop-by-hop header filtering in both directions

use super::fetcher::Fetcher;
use crate::config::{AppConfig, NetworkConfig};
use crate::error::{Result, VerdantError};
use crate::http::{Request, Response};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Returns true for headers that must not cross the proxy boundary.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Network fetcher over a shared reqwest client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT.min(timeout))
            .user_agent(AppConfig::USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| VerdantError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self { client, timeout })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_send_error(&self, request: &Request, err: reqwest::Error) -> VerdantError {
        if err.is_timeout() {
            VerdantError::Timeout(self.timeout)
        } else {
            VerdantError::Network {
                message: format!("{} {} failed: {}", request.method(), request.url(), err),
                source: Some(err),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone());

        for (name, value) in request.headers() {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_send_error(request, e))?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(request, e))?;

        debug!(
            "{} {} -> {} ({} bytes)",
            request.method(),
            request.url(),
            status,
            body.len()
        );

        Ok(Response::from_parts(status, headers, body))
    }
}
