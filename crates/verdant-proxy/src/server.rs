//! HTTP server implementation using Axum.

use crate::handler::{handle_health, handle_proxy, handle_stats, MAX_BODY_BYTES};
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use url::Url;
use verdant_core::ServiceWorker;

/// Application state shared across handlers.
pub struct AppState {
    /// Worker that serves every proxied request
    pub worker: Arc<ServiceWorker>,
    /// Origin that incoming paths are resolved against
    pub upstream: Url,
}

/// Build the router: two control routes, everything else is proxied.
pub fn router(state: Arc<AppState>) -> Router {
    // Configure CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/_verdant/health", get(handle_health))
        .route("/_verdant/stats", get(handle_stats))
        .fallback(handle_proxy)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the proxy server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    worker: Arc<ServiceWorker>,
    upstream: Url,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let app = router(Arc::new(AppState { worker, upstream }));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
