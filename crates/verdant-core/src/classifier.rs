//! Request classification.
//!
//! Maps every intercepted request to the cache it belongs in and the
//! strategy that serves it. Rules are evaluated in order and the first match
//! wins; the order is the tie-break policy (an image under `/assets/` is a
//! static asset, a navigation to `/api/...` is API traffic).

use crate::config::{CacheNames, CacheRole, WorkerConfig};
use crate::http::{Destination, Request};
use crate::strategy::Strategy;

/// Extensions of build outputs: style sheets, scripts and web fonts.
pub const STATIC_EXTENSIONS: &[&str] = &["css", "js", "mjs", "woff", "woff2"];

/// Extensions of raster images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif"];

/// The (cache, strategy) pair chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub role: CacheRole,
    pub strategy: Strategy,
}

impl Assignment {
    pub const fn new(role: CacheRole, strategy: Strategy) -> Self {
        Self { role, strategy }
    }

    /// Resolve the role to a concrete versioned cache name.
    pub fn cache_name<'a>(&self, names: &'a CacheNames) -> &'a str {
        names.for_role(self.role)
    }
}

type Predicate = Box<dyn Fn(&Request) -> bool + Send + Sync>;

/// One classification rule.
pub struct Rule {
    name: &'static str,
    predicate: Predicate,
    assignment: Assignment,
}

impl Rule {
    pub fn new(
        name: &'static str,
        assignment: Assignment,
        predicate: impl Fn(&Request) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            predicate: Box::new(predicate),
            assignment,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn assignment(&self) -> Assignment {
        self.assignment
    }

    pub fn matches(&self, request: &Request) -> bool {
        (self.predicate)(request)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("assignment", &self.assignment)
            .finish()
    }
}

/// Ordered rule list with a catch-all default.
#[derive(Debug)]
pub struct Classifier {
    rules: Vec<Rule>,
    fallback: Assignment,
}

impl Classifier {
    /// Build the standard rule set for a worker config.
    pub fn new(config: &WorkerConfig) -> Self {
        let assets_segment = config.assets_segment.clone();
        let api_prefix = config.api_prefix.clone();

        let rules = vec![
            Rule::new(
                "static-asset",
                Assignment::new(CacheRole::Static, Strategy::CacheFirst),
                move |req| {
                    req.path().contains(assets_segment.as_str())
                        || has_extension(req, STATIC_EXTENSIONS)
                },
            ),
            Rule::new(
                "image",
                Assignment::new(CacheRole::Image, Strategy::CacheFirst),
                |req| *req.destination() == Destination::Image || has_extension(req, IMAGE_EXTENSIONS),
            ),
            Rule::new(
                "api",
                Assignment::new(CacheRole::Api, Strategy::NetworkFirst),
                move |req| req.path().starts_with(api_prefix.as_str()),
            ),
            Rule::new(
                "navigation",
                Assignment::new(CacheRole::Static, Strategy::StaleWhileRevalidate),
                |req| req.is_navigation(),
            ),
        ];

        Self {
            rules,
            fallback: Assignment::new(CacheRole::Static, Strategy::NetworkFirst),
        }
    }

    /// Classify a request. Never fails.
    pub fn classify(&self, request: &Request) -> Assignment {
        self.rules
            .iter()
            .find(|rule| rule.matches(request))
            .map(Rule::assignment)
            .unwrap_or(self.fallback)
    }

    /// Name of the rule that matched, or `"default"`.
    pub fn matching_rule(&self, request: &Request) -> &'static str {
        self.rules
            .iter()
            .find(|rule| rule.matches(request))
            .map(Rule::name)
            .unwrap_or("default")
    }

    /// Rule names in evaluation order.
    pub fn rules(&self) -> Vec<&'static str> {
        self.rules.iter().map(Rule::name).collect()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&WorkerConfig::default())
    }
}

fn has_extension(request: &Request, extensions: &[&str]) -> bool {
    request
        .extension()
        .map(|ext| extensions.contains(&ext.as_str()))
        .unwrap_or(false)
}
