//! proximity-sync - session position sync for a remote voice service
//!
//! This process:
//! - Collects session positions from the host's shards every second
//! - Pushes changed snapshots to the voice service over Socket.IO
//! - Reconnects on its own and resyncs when the service accepts it again
//! - Exposes health/ready endpoints and Prometheus metrics

use anyhow::Result;
use proximity_sync::config::SyncConfig;
use proximity_sync::events::{register_default_handlers, EventRegistry, HandlerContext};
use proximity_sync::health::{self, AppState};
use proximity_sync::host::{LogBroadcaster, LogVersionCheck};
use proximity_sync::metrics::SyncMetrics;
use proximity_sync::shard::{InMemoryHost, ShardStats};
use proximity_sync::socket::{ConnectionManager, WebSocketConnector};
use proximity_sync::tracker::{Tracker, UpdatePublisher};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let config = SyncConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("proximity_sync={}", config.log_level).parse()?)
                .add_directive("tokio_tungstenite=warn".parse()?)
                .add_directive("tungstenite=warn".parse()?),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server_id = %config.server_id,
        remote = %config.socket.host(),
        "Starting proximity-sync"
    );

    let metrics = SyncMetrics::install()?;
    info!("Prometheus metrics initialized");

    let shutdown = CancellationToken::new();

    let registry = Arc::new(EventRegistry::new(metrics.clone()));
    let connection = ConnectionManager::new(
        config.socket.clone(),
        Arc::new(WebSocketConnector),
        Arc::clone(&registry),
        metrics.clone(),
    );

    // Standalone runs track a single shard named after this server
    let host = InMemoryHost::new();
    host.add_shard(config.server_id.clone());
    let shard_stats = ShardStats::new();

    let (tracker, tracker_handle) = Tracker::new(
        config.tracker.clone(),
        Arc::new(host.clone()),
        UpdatePublisher::new(Arc::new(connection.clone())),
        shard_stats.clone(),
        metrics.clone(),
        shutdown.child_token(),
    );

    register_default_handlers(
        &registry,
        HandlerContext {
            tracker: tracker_handle.clone(),
            broadcaster: Arc::new(LogBroadcaster),
            versions: Arc::new(LogVersionCheck),
            broadcasts: config.broadcasts.clone(),
        },
    );

    let tracker_task = tokio::spawn(tracker.run());
    connection.connect();

    // Start health server
    let app_state = AppState {
        server_id: config.server_id.clone(),
        connection: connection.clone(),
        shard_stats,
        metrics: metrics.clone(),
    };
    let addr: SocketAddr = ([0, 0, 0, 0], config.http_port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port = config.http_port, "Starting HTTP server");

    let http_shutdown = shutdown.clone();
    let mut http_task = tokio::spawn(async move {
        axum::serve(listener, health::router(app_state))
            .with_graceful_shutdown(http_shutdown.cancelled_owned())
            .await
    });

    tokio::select! {
        result = &mut http_task => {
            match result {
                Ok(Err(e)) => error!(error = %e, "HTTP server error"),
                Err(e) => error!(error = %e, "HTTP server task failed"),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    // Graceful shutdown
    info!("Shutting down...");
    tracker_handle.shutdown();
    connection.shutdown().await;
    shutdown.cancel();

    if let Err(e) = tracker_task.await {
        error!(error = %e, "Tracker task failed");
    }
    if !http_task.is_finished() {
        let _ = http_task.await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
