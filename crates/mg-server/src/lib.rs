//! mg-server: HTTP API, job registry, worker pool and observation channel.
//!
//! This crate ties the engine adapter to a running server application. It
//! provides:
//!
//! - Axum-based HTTP API for search, inspection and downloads
//! - An in-memory job registry whose jobs run on a bounded worker pool
//! - Progress observation over WebSocket and SSE
//! - A background sweeper for old downloads
//! - Graceful shutdown via signal handling

pub mod bridge;
pub mod channel;
pub mod context;
pub mod error;
pub mod middleware;
pub mod pool;
pub mod registry;
pub mod router;
pub mod routes;
pub mod sweeper;

use std::net::SocketAddr;
use std::sync::Arc;

use mg_core::config::Config;
use mg_engine::{MediaEngine, ToolRegistry, YtDlpEngine};
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Start the mediagrab server.
///
/// Discovers the external tools, builds the [`AppContext`] around a yt-dlp
/// engine, spawns the download sweeper and serves HTTP until a shutdown
/// signal arrives.
pub async fn start(config: Config) -> mg_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let engine: Arc<dyn MediaEngine> = Arc::new(YtDlpEngine::new(tools.clone()));
    serve(config, engine, tools, CancellationToken::new()).await
}

/// Serve `engine` until a signal arrives or `cancel` fires.
pub async fn serve(
    config: Config,
    engine: Arc<dyn MediaEngine>,
    tools: Arc<ToolRegistry>,
    cancel: CancellationToken,
) -> mg_core::Result<()> {
    let downloads_dir = config.downloads.dir.clone();
    if !downloads_dir.exists() {
        std::fs::create_dir_all(&downloads_dir)?;
        tracing::info!("Created downloads directory {}", downloads_dir.display());
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| mg_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let static_dir = config.server.static_dir.clone();
    let max_age = config.downloads.max_age();
    let sweep_interval = std::time::Duration::from_secs(config.downloads.sweep_interval_secs);

    let ctx = AppContext::new(config, engine, tools);

    let sweeper_handle = tokio::spawn(sweeper::run_sweeper(
        downloads_dir,
        max_age,
        sweep_interval,
        cancel.clone(),
    ));

    let app = router::build_router(ctx, static_dir);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| mg_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    // Signal background tasks to stop.
    cancel.cancel();
    let _ = sweeper_handle.await;

    served.map_err(|e| mg_core::Error::Internal(format!("Server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT, SIGTERM or cancellation).
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
