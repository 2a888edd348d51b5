//! Verdant Proxy - offline-first caching reverse proxy.
//!
//! Sits between a web client and its origin. Every request is classified and
//! served by the caching engine in verdant-core, so pages and assets the
//! client has seen keep loading when the origin is unreachable.

mod handler;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;
use verdant_core::config::PathsConfig;
use verdant_core::{ServiceWorker, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "verdant-proxy")]
#[command(about = "Offline-first caching reverse proxy")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Origin requests are forwarded to, e.g. http://localhost:4200
    #[arg(short, long)]
    upstream: String,

    /// Worker config file (JSON); defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache database path (defaults to the user cache directory)
    #[arg(long)]
    cache_db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn default_cache_db() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(PathsConfig::CACHE_DIR_NAME)
        .join(PathsConfig::CACHE_DB_FILENAME)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Verdant Proxy");

    let upstream = Url::parse(&args.upstream)
        .with_context(|| format!("Invalid upstream URL: {}", args.upstream))?;

    let mut config = match &args.config {
        Some(path) => WorkerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => WorkerConfig::default(),
    };
    config.origin = Some(upstream.to_string());

    let cache_db = args.cache_db.unwrap_or_else(default_cache_db);
    info!("Cache database: {}", cache_db.display());
    info!("Upstream: {}", upstream);

    let worker = ServiceWorker::builder(config)
        .with_storage_path(&cache_db)
        .build()?;

    // An unreachable origin at startup leaves the worker redundant; requests
    // then pass straight through.
    match worker.start().await {
        Ok(report) => info!(
            "Worker active, {} outdated caches removed",
            report.deleted.len()
        ),
        Err(e) => warn!("Worker not started, proxying without cache: {}", e),
    }

    let addr = server::start_server(Arc::new(worker), upstream, &args.host, args.port).await?;

    // Print port for launchers and tests to read
    println!("PROXY_PORT={}", addr.port());

    info!("Proxy running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
