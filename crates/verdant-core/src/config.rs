//! Centralized configuration for Verdant.
//!
//! Constant holder structs for network and path parameters, plus the
//! deployable [`WorkerConfig`] that names the caches and the pre-cache list.

use crate::error::{Result, VerdantError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "Verdant";
    pub const USER_AGENT: &'static str = "Verdant/0.2";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Shared directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const CACHE_DIR_NAME: &'static str = "verdant";
    pub const CACHE_DB_FILENAME: &'static str = "caches.sqlite";
}

/// Logical role of a named cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheRole {
    Static,
    Image,
    Api,
}

impl CacheRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheRole::Static => "static",
            CacheRole::Image => "images",
            CacheRole::Api => "api",
        }
    }
}

impl std::fmt::Display for CacheRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Worker configuration, usually loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Prefix shared by every cache name.
    pub cache_prefix: String,
    /// Version tag appended to every cache name.
    pub version: String,
    /// Paths fetched into the static cache at install time, in order.
    pub precache: Vec<String>,
    /// Path prefix that marks API traffic.
    pub api_prefix: String,
    /// Path segment that marks bundled build assets.
    pub assets_segment: String,
    /// Origin the pre-cache paths are resolved against.
    pub origin: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_prefix: "reviverde".to_string(),
            version: "v2".to_string(),
            precache: [
                "/",
                "/quem-somos",
                "/o-que-fazemos",
                "/projetos",
                "/como-participar",
                "/contato",
                "/styles.css",
                "/main.js",
                "/polyfills.js",
                "/runtime.js",
                "/ReviVerde_logo_transparent.png",
                "/manifest.json",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            api_prefix: "/api/".to_string(),
            assets_segment: "/assets/".to_string(),
            origin: None,
        }
    }
}

impl WorkerConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| VerdantError::io_with_path(e, path))?;
        let config: WorkerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that would produce unusable cache names or rules.
    pub fn validate(&self) -> Result<()> {
        if self.cache_prefix.trim().is_empty() {
            return Err(VerdantError::Config {
                message: "cache_prefix must not be empty".to_string(),
            });
        }
        if self.version.trim().is_empty() {
            return Err(VerdantError::Config {
                message: "version must not be empty".to_string(),
            });
        }
        if self.assets_segment.trim().is_empty() {
            return Err(VerdantError::Config {
                message: "assets_segment must not be empty".to_string(),
            });
        }
        if !self.api_prefix.starts_with('/') {
            return Err(VerdantError::Config {
                message: format!("api_prefix must start with '/': {}", self.api_prefix),
            });
        }
        Ok(())
    }

    /// Versioned cache names for this config.
    pub fn cache_names(&self) -> CacheNames {
        CacheNames::from_config(self)
    }
}

/// The versioned names of the caches the running version owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub static_cache: String,
    pub image_cache: String,
    pub api_cache: String,
}

impl CacheNames {
    pub fn from_config(config: &WorkerConfig) -> Self {
        let name = |role: CacheRole| format!("{}-{}-{}", config.cache_prefix, role, config.version);
        Self {
            static_cache: name(CacheRole::Static),
            image_cache: name(CacheRole::Image),
            api_cache: name(CacheRole::Api),
        }
    }

    /// Concrete cache name for a role.
    pub fn for_role(&self, role: CacheRole) -> &str {
        match role {
            CacheRole::Static => &self.static_cache,
            CacheRole::Image => &self.image_cache,
            CacheRole::Api => &self.api_cache,
        }
    }

    /// The declared "keep" set used by the activation sweep.
    pub fn current(&self) -> [&str; 3] {
        [
            self.static_cache.as_str(),
            self.image_cache.as_str(),
            self.api_cache.as_str(),
        ]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.current().contains(&name)
    }
}

impl Default for CacheNames {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_cache_names() {
        let names = CacheNames::default();
        assert_eq!(names.static_cache, "reviverde-static-v2");
        assert_eq!(names.image_cache, "reviverde-images-v2");
        assert_eq!(names.api_cache, "reviverde-api-v2");
        assert!(names.contains("reviverde-api-v2"));
        assert!(!names.contains("reviverde-v2"));
    }

    #[test]
    fn test_load_partial_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("worker.json");
        std::fs::write(&path, r#"{"version": "v3", "precache": ["/", "/app.js"]}"#).unwrap();

        let config = WorkerConfig::load(&path).unwrap();
        assert_eq!(config.version, "v3");
        assert_eq!(config.cache_prefix, "reviverde");
        assert_eq!(config.precache, vec!["/", "/app.js"]);
        assert_eq!(config.cache_names().static_cache, "reviverde-static-v3");
    }

    #[test]
    fn test_load_rejects_empty_version() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("worker.json");
        std::fs::write(&path, r#"{"version": ""}"#).unwrap();

        let err = WorkerConfig::load(&path).unwrap_err();
        assert!(matches!(err, VerdantError::Config { .. }));
    }

    #[test]
    fn test_rejects_blank_assets_segment() {
        // An empty segment would match every path as a static asset
        for segment in ["", "  "] {
            let config = WorkerConfig {
                assets_segment: segment.to_string(),
                ..WorkerConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("assets_segment"));
        }
        assert!(WorkerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let err = WorkerConfig::load("/nonexistent/verdant/worker.json").unwrap_err();
        assert!(matches!(err, VerdantError::Io { path: Some(_), .. }));
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(NetworkConfig::REQUEST_TIMEOUT > NetworkConfig::CONNECT_TIMEOUT);
        assert!(NetworkConfig::CONNECT_TIMEOUT > Duration::ZERO);
    }
}
