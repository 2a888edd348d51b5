//! Error types for Verdant.
//!
//! Network failures are the only recoverable kind: every caching strategy
//! defines its own fallback for them. Everything else is either terminal or
//! best-effort (cache writes).

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Verdant core.
#[derive(Debug, Error)]
pub enum VerdantError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Storage errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Only successful responses to GET requests may be stored.
    #[error("Response for {url} is not cacheable: {reason}")]
    NotCacheable { url: String, reason: String },

    #[error("Invalid request URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    // Lifecycle errors
    #[error("Installation failed: {message}")]
    InstallationFailed { message: String },

    #[error("Cannot {action} while worker is {state}")]
    InvalidState { action: &'static str, state: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Verdant operations.
pub type Result<T> = std::result::Result<T, VerdantError>;

impl From<std::io::Error> for VerdantError {
    fn from(err: std::io::Error) -> Self {
        VerdantError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for VerdantError {
    fn from(err: serde_json::Error) -> Self {
        VerdantError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for VerdantError {
    fn from(err: rusqlite::Error) -> Self {
        VerdantError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for VerdantError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VerdantError::Timeout(std::time::Duration::from_secs(0))
        } else {
            VerdantError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl VerdantError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        VerdantError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a network failure without an underlying reqwest error.
    pub fn network(message: impl Into<String>) -> Self {
        VerdantError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// True when the error means "the network could not produce a response".
    ///
    /// These are the failures that trigger a strategy's fallback step.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, VerdantError::Network { .. } | VerdantError::Timeout(_))
    }

    /// HTTP status the proxy reports when this error reaches the client.
    pub fn to_http_status(&self) -> u16 {
        match self {
            VerdantError::Timeout(_) => 504,
            VerdantError::Network { .. } => 502,
            VerdantError::InvalidUrl { .. } => 400,
            _ => 500,
        }
    }
}
