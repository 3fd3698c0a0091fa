//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use std::io;
use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::info;

use crate::cache::ShardedCache;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{HealthResponse, SnapshotResponse, StatsResponse};
use crate::persistence::{SnapshotManager, StringSerializer};

/// Application state shared across all handlers.
///
/// The cache is internally synchronized, so handlers share it through a
/// plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Shared sharded cache
    pub cache: Arc<ShardedCache<String, String>>,
    /// Snapshot manager, absent when persistence is disabled
    pub snapshots: Option<Arc<SnapshotManager<String, String>>>,
}

impl AppState {
    /// Creates a new AppState around an existing cache.
    pub fn new(
        cache: Arc<ShardedCache<String, String>>,
        snapshots: Option<Arc<SnapshotManager<String, String>>>,
    ) -> Self {
        Self { cache, snapshots }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Builds the cache with the configured capacity and concurrency level.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = Arc::new(ShardedCache::new(
            config.capacity,
            config.concurrency_level,
        )?);
        Ok(Self::with_cache(cache, config))
    }

    /// Wraps an already-built cache, adding a snapshot manager that shares
    /// the cache's clock if a snapshot path is configured.
    pub fn with_cache(cache: Arc<ShardedCache<String, String>>, config: &Config) -> Self {
        let snapshots = config.snapshot_path.as_ref().map(|path| {
            Arc::new(SnapshotManager::new(
                path.clone(),
                Arc::new(StringSerializer),
                Arc::new(StringSerializer),
                cache.clock(),
            ))
        });
        Self::new(cache, snapshots)
    }
}

/// Handler for GET /stats
///
/// Returns aggregated statistics across all shards.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.stats();
    Json(StatsResponse::new(
        &stats,
        state.cache.capacity(),
        state.cache.shard_count(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for POST /snapshot
///
/// Writes a snapshot immediately. File I/O runs on the blocking pool.
pub async fn snapshot_handler(State(state): State<AppState>) -> Result<Json<SnapshotResponse>> {
    let snapshots = state.snapshots.ok_or(CacheError::PersistenceDisabled)?;
    let cache = state.cache;

    let manager = snapshots.clone();
    let entries = tokio::task::spawn_blocking(move || manager.save(&cache))
        .await
        .map_err(|e| CacheError::Io(io::Error::other(e.to_string())))??;

    info!("Snapshot requested via admin API: {} entries", entries);
    Ok(Json(SnapshotResponse::new(snapshots.path(), entries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_without_persistence() -> AppState {
        let cache = Arc::new(ShardedCache::new(100, 4).unwrap());
        AppState::new(cache, None)
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = state_without_persistence();
        state.cache.put("a".to_string(), "1".to_string(), 0);
        state.cache.get(&"a".to_string());
        state.cache.get(&"missing".to_string());

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 1);
        assert_eq!(response.misses, 1);
        assert_eq!(response.total_entries, 1);
        assert_eq!(response.capacity, 100);
        assert_eq!(response.shard_count, 4);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_snapshot_handler_disabled() {
        let result = snapshot_handler(State(state_without_persistence())).await;
        assert!(matches!(result, Err(CacheError::PersistenceDisabled)));
    }

    #[tokio::test]
    async fn test_snapshot_handler_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            snapshot_path: Some(dir.path().join("cache.dump")),
            ..Config::default()
        };
        let state = AppState::from_config(&config).unwrap();
        state.cache.put("k".to_string(), "v".to_string(), 0);

        let response = snapshot_handler(State(state)).await.unwrap();
        assert_eq!(response.entries, 1);
        assert!(dir.path().join("cache.dump").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_snapshot_requests_both_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            capacity: 1_000,
            snapshot_path: Some(dir.path().join("cache.dump")),
            ..Config::default()
        };
        let state = AppState::from_config(&config).unwrap();
        for i in 0..500 {
            state.cache.put(format!("k{i}"), format!("v{i}"), 0);
        }

        for _ in 0..10 {
            let (first, second) = tokio::join!(
                snapshot_handler(State(state.clone())),
                snapshot_handler(State(state.clone()))
            );
            assert_eq!(first.unwrap().entries, 500);
            assert_eq!(second.unwrap().entries, 500);
        }
    }

    #[test]
    fn test_from_config_rejects_zero_capacity() {
        let config = Config {
            capacity: 0,
            ..Config::default()
        };
        assert!(matches!(
            AppState::from_config(&config),
            Err(CacheError::Config(_))
        ));
    }
}
