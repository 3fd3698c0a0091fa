//! LRU Cache Server - A sharded in-memory cache with TTL expiry
//!
//! Serves the line protocol over TCP and an admin API over HTTP, restoring
//! from and writing to a snapshot file when persistence is enabled.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lru_cache_server::api::create_router;
use lru_cache_server::{server, AppState, Config, ShardedCache};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the sharded cache with its background janitor
/// 4. Restore the snapshot, if any
/// 5. Start the admin HTTP API and the line-protocol TCP server
/// 6. On SIGINT/SIGTERM: stop accepting, stop the janitor, write a final snapshot
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lru_cache_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LRU Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: capacity={}, concurrency_level={}, port={}, admin_port={}, snapshot={:?}",
        config.capacity,
        config.concurrency_level,
        config.server_port,
        config.admin_port,
        config.snapshot_path
    );

    let (cache, mut janitor) = ShardedCache::spawn_with_janitor(
        config.capacity,
        config.concurrency_level,
        config.cleanup_interval(),
        config.cleanup_budget,
    )
    .context("Invalid cache configuration")?;
    let state = AppState::with_cache(cache, &config);
    info!("Cache initialized with {} shards", state.cache.shard_count());

    if let Some(snapshots) = &state.snapshots {
        let report = snapshots
            .load(&state.cache)
            .with_context(|| format!("Failed to load snapshot {}", snapshots.path().display()))?;
        info!(
            "Snapshot restored: {} entries, {} expired on load",
            report.restored, report.expired
        );
    } else {
        info!("Persistence disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Admin API
    let admin_addr = SocketAddr::from(([0, 0, 0, 0], config.admin_port));
    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .with_context(|| format!("Failed to bind admin API on {admin_addr}"))?;
    info!("Admin API listening on http://{}", admin_addr);
    let app = create_router(state.clone());
    let admin_shutdown = wait_for(shutdown_rx.clone());
    let admin = tokio::spawn(async move {
        axum::serve(admin_listener, app)
            .with_graceful_shutdown(admin_shutdown)
            .await
    });

    // Line protocol
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind cache server on {addr}"))?;
    let tcp = tokio::spawn(server::serve(
        listener,
        state.cache.clone(),
        wait_for(shutdown_rx),
    ));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    match tcp.await {
        Ok(Err(e)) => error!("Cache server error: {}", e),
        Err(e) => error!("Cache server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    match admin.await {
        Ok(Err(e)) => error!("Admin API error: {}", e),
        Err(e) => error!("Admin API task failed: {}", e),
        Ok(Ok(())) => {}
    }

    janitor.stop().await;

    if let Some(snapshots) = &state.snapshots {
        let manager = snapshots.clone();
        let cache = state.cache.clone();
        match tokio::task::spawn_blocking(move || manager.save(&cache)).await {
            Ok(Ok(entries)) => info!("Final snapshot written: {} entries", entries),
            Ok(Err(e)) => error!("Final snapshot failed: {}", e),
            Err(e) => error!("Final snapshot task failed: {}", e),
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves once the shutdown flag flips, or its sender is gone.
async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
