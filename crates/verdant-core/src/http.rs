//! Request and response model shared by the classifier, the strategies and
//! the storage backend.
//!
//! Both types are immutable once built. A [`Response`] body is a
//! reference-counted [`Bytes`] buffer, so cloning a response to return it to
//! the caller and store it in a cache never copies or consumes the body.

use crate::error::{Result, VerdantError};
use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// What kind of resource the client intends to use the response as.
///
/// Mirrors the values browsers send in `Sec-Fetch-Dest`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    #[default]
    Empty,
    Other(String),
}

impl Destination {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "image" => Destination::Image,
            "script" | "worker" | "sharedworker" | "serviceworker" => Destination::Script,
            "style" => Destination::Style,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            "" | "empty" => Destination::Empty,
            other => Destination::Other(other.to_string()),
        }
    }
}

/// Request mode; `Navigate` marks a top-level page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    #[default]
    Cors,
    NoCors,
    SameOrigin,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` value. Unknown values fall back to `Cors`.
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => RequestMode::Navigate,
            "no-cors" => RequestMode::NoCors,
            "same-origin" => RequestMode::SameOrigin,
            _ => RequestMode::Cors,
        }
    }
}

/// An intercepted outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: Url,
    method: Method,
    destination: Destination,
    mode: RequestMode,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            destination: Destination::default(),
            mode: RequestMode::default(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Build a GET request from an absolute URL string.
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new(Method::GET, parse_url(url)?))
    }

    /// Build a top-level page load for `url`.
    pub fn navigate(url: &str) -> Result<Self> {
        Ok(Self::get(url)?
            .with_mode(RequestMode::Navigate)
            .with_destination(Destination::Document))
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Body forwarded to the network; never part of the cache identity.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn mode(&self) -> RequestMode {
        self.mode
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Lowercased extension of the last path segment, if any.
    pub fn extension(&self) -> Option<String> {
        let last = self.url.path_segments()?.next_back()?;
        let (stem, ext) = last.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// True for requests whose response is rendered as a document.
    pub fn is_document(&self) -> bool {
        self.destination == Destination::Document
    }

    /// Identity used as the storage key: method plus URL without fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }

    /// A GET request for another path on the same origin.
    pub fn sibling(&self, path: &str) -> Result<Self> {
        let url = self.url.join(path).map_err(|e| VerdantError::InvalidUrl {
            url: path.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(Method::GET, url))
    }
}

/// Parse an absolute URL, mapping failures into [`VerdantError::InvalidUrl`].
pub fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| VerdantError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// A response produced by the network or served from a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Build a response from stored or fetched parts.
    pub fn from_parts(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// The minimal page served when a navigation has nowhere else to go.
    pub fn offline() -> Self {
        Response::new(503)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body("Offline")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Success indicator: status in 200..=299.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// `206 Partial Content`: a byte range, never the whole resource.
    pub fn is_partial(&self) -> bool {
        self.status == 206
    }

    /// Canonical reason phrase for the status code, if it has one.
    pub fn status_text(&self) -> &'static str {
        reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("")
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_parts(self) -> (u16, Vec<(String, String)>, Bytes) {
        (self.status, self.headers, self.body)
    }
}
