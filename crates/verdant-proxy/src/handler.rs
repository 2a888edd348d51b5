//! Request handlers and the axum <-> worker conversions.

use crate::server::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;
use verdant_core::network::is_hop_by_hop;
use verdant_core::{Destination, RequestMode, VerdantError};

/// Largest request body forwarded upstream; larger bodies get 413.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Client validators and ranges; upstream always sees an unconditional,
/// full request.
const CONDITIONAL_HEADERS: &[&str] = &[
    "if-none-match",
    "if-modified-since",
    "if-match",
    "if-unmodified-since",
    "if-range",
    "range",
];

/// Health check endpoint.
pub async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "state": state.worker.state().await,
        "controlling": state.worker.is_controlling(),
    }))
}

/// Per-cache entry counts and sizes.
pub async fn handle_stats(State(state): State<Arc<AppState>>) -> Response {
    match state.worker.namespace().stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Fallback handler: every other request goes through the worker.
pub async fn handle_proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match to_worker_request(&state.upstream, method, &uri, &headers, body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    match state.worker.handle_fetch(&request).await {
        Ok(response) => into_http_response(response),
        Err(e) => {
            warn!("{} {} failed: {}", request.method(), request.url(), e);
            error_response(&e)
        }
    }
}

/// Resolve an incoming request against the upstream origin.
///
/// `Sec-Fetch-Dest` and `Sec-Fetch-Mode` become the destination hint and
/// navigation flag. Hop-by-hop, conditional and range headers are dropped.
pub fn to_worker_request(
    upstream: &Url,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> verdant_core::Result<verdant_core::Request> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = upstream
        .join(path_and_query)
        .map_err(|e| VerdantError::InvalidUrl {
            url: path_and_query.to_string(),
            message: e.to_string(),
        })?;

    let mut converted = verdant_core::Request::new(method, url)
        .with_destination(
            header(headers, "sec-fetch-dest")
                .map_or_else(Destination::default, Destination::from_header),
        )
        .with_mode(
            header(headers, "sec-fetch-mode")
                .map_or_else(RequestMode::default, RequestMode::from_header),
        )
        .with_body(body);

    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) || CONDITIONAL_HEADERS.contains(&name.as_str()) {
            continue;
        }
        match value.to_str() {
            Ok(value) => converted = converted.with_header(name.as_str(), value),
            Err(_) => debug!("Dropping non-text header {}", name),
        }
    }

    Ok(converted)
}

/// Turn a worker response into an axum response.
pub fn into_http_response(response: verdant_core::Response) -> Response {
    let (status, headers, body) = response.into_parts();

    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in headers.iter().filter(|(name, _)| !is_hop_by_hop(name)) {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.body(Body::from(body)) {
        Ok(response) => response,
        Err(e) => {
            warn!("Invalid upstream response: {}", e);
            (StatusCode::BAD_GATEWAY, "Invalid upstream response").into_response()
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn error_response(error: &VerdantError) -> Response {
    let status =
        StatusCode::from_u16(error.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, error.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> Url {
        Url::parse("http://localhost:4200/").unwrap()
    }

    fn convert(request: axum::http::Request<Bytes>) -> verdant_core::Request {
        let (parts, body) = request.into_parts();
        to_worker_request(&upstream(), parts.method, &parts.uri, &parts.headers, body).unwrap()
    }

    #[test]
    fn test_converts_navigation() {
        let request = axum::http::Request::builder()
            .uri("/projetos?tab=2")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Dest", "document")
            .header("Accept", "text/html")
            .header("Connection", "keep-alive")
            .body(Bytes::new())
            .unwrap();

        let converted = convert(request);

        assert_eq!(converted.url().as_str(), "http://localhost:4200/projetos?tab=2");
        assert!(converted.is_navigation());
        assert_eq!(*converted.destination(), Destination::Document);
        assert!(converted
            .headers()
            .iter()
            .any(|(name, value)| name == "accept" && value == "text/html"));
        assert!(!converted
            .headers()
            .iter()
            .any(|(name, _)| name == "connection"));
    }

    #[test]
    fn test_drops_conditional_and_range_headers() {
        let request = axum::http::Request::builder()
            .uri("/projetos")
            .header("Sec-Fetch-Mode", "navigate")
            .header("If-None-Match", "\"abc\"")
            .header("If-Modified-Since", "Wed, 21 Oct 2015 07:28:00 GMT")
            .header("Range", "bytes=0-1")
            .header("Accept-Language", "pt-BR")
            .body(Bytes::new())
            .unwrap();

        let converted = convert(request);

        let names: Vec<&str> = converted
            .headers()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert!(names.contains(&"accept-language"));
        for dropped in ["if-none-match", "if-modified-since", "range"] {
            assert!(!names.contains(&dropped), "{} was forwarded", dropped);
        }
    }

    #[test]
    fn test_converts_body_and_method() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/contact")
            .body(Bytes::from_static(b"{\"name\":\"ana\"}"))
            .unwrap();

        let converted = convert(request);

        assert_eq!(converted.method().as_str(), "POST");
        assert_eq!(converted.body().as_ref(), b"{\"name\":\"ana\"}");
        assert_eq!(converted.mode(), RequestMode::Cors);
        assert_eq!(*converted.destination(), Destination::Empty);
    }

    #[test]
    fn test_response_drops_hop_by_hop_headers() {
        let response = verdant_core::Response::new(200)
            .with_header("Content-Type", "text/css")
            .with_header("Transfer-Encoding", "chunked")
            .with_body("body{}");

        let converted = into_http_response(response);

        assert_eq!(converted.status(), StatusCode::OK);
        assert_eq!(converted.headers()["content-type"], "text/css");
        assert!(converted.headers().get("transfer-encoding").is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        let response = error_response(&VerdantError::network("refused"));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
