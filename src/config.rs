//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Total number of entries the cache can hold across all shards
    pub capacity: usize,
    /// Requested number of shards (rounded up to a power of two, capped by capacity)
    pub concurrency_level: usize,
    /// TCP port of the line-protocol server
    pub server_port: u16,
    /// HTTP port of the admin API
    pub admin_port: u16,
    /// Snapshot file; `None` disables persistence
    pub snapshot_path: Option<PathBuf>,
    /// Janitor interval in milliseconds
    pub cleanup_interval_ms: u64,
    /// Maximum entries inspected per shard on each janitor pass
    pub cleanup_budget: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Total cache entries (default: 100)
    /// - `CONCURRENCY_LEVEL` - Requested shard count (default: 16)
    /// - `SERVER_PORT` - Line-protocol TCP port (default: 8080)
    /// - `ADMIN_PORT` - Admin HTTP port (default: 3000)
    /// - `SNAPSHOT_PATH` - Snapshot file, empty to disable (default: lru-cache.dump)
    /// - `CLEANUP_INTERVAL_MS` - Janitor period in ms (default: 1000)
    /// - `CLEANUP_BUDGET` - Entries inspected per shard per pass (default: 20)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: env_or("CACHE_CAPACITY", defaults.capacity),
            concurrency_level: env_or("CONCURRENCY_LEVEL", defaults.concurrency_level),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            admin_port: env_or("ADMIN_PORT", defaults.admin_port),
            snapshot_path: match env::var("SNAPSHOT_PATH") {
                Ok(path) if path.trim().is_empty() => None,
                Ok(path) => Some(PathBuf::from(path)),
                Err(_) => defaults.snapshot_path,
            },
            cleanup_interval_ms: env_or("CLEANUP_INTERVAL_MS", defaults.cleanup_interval_ms),
            cleanup_budget: env_or("CLEANUP_BUDGET", defaults.cleanup_budget),
        }
    }

    /// Janitor period as a `Duration`.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.max(1))
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 100,
            concurrency_level: 16,
            server_port: 8080,
            admin_port: 3000,
            snapshot_path: Some(PathBuf::from("lru-cache.dump")),
            cleanup_interval_ms: 1000,
            cleanup_budget: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.concurrency_level, 16);
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.admin_port, 3000);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("lru-cache.dump")));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(1));
        assert_eq!(config.cleanup_budget, 20);
    }

    #[test]
    fn test_config_from_env() {
        // Single test touches the environment to avoid races between tests.
        for var in [
            "CACHE_CAPACITY",
            "CONCURRENCY_LEVEL",
            "SERVER_PORT",
            "ADMIN_PORT",
            "SNAPSHOT_PATH",
            "CLEANUP_INTERVAL_MS",
            "CLEANUP_BUDGET",
        ] {
            env::remove_var(var);
        }

        let config = Config::from_env();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.cleanup_budget, 20);
        assert!(config.snapshot_path.is_some());

        env::set_var("CACHE_CAPACITY", "5000");
        env::set_var("CONCURRENCY_LEVEL", "not-a-number");
        env::set_var("SNAPSHOT_PATH", "");
        let config = Config::from_env();
        assert_eq!(config.capacity, 5000);
        assert_eq!(config.concurrency_level, 16);
        assert!(config.snapshot_path.is_none());

        env::remove_var("CACHE_CAPACITY");
        env::remove_var("CONCURRENCY_LEVEL");
        env::remove_var("SNAPSHOT_PATH");
    }
}
