//! Janitor Task
//!
//! Background task that periodically drops a bounded number of expired
//! entries from every shard.

use std::any::Any;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cache::{Shard, ShardedCache};

/// Entries inspected per shard on each pass unless configured otherwise.
pub const DEFAULT_SWEEP_BUDGET: usize = 20;

// == Expiry Sweep ==
/// Something the janitor can ask to drop up to `budget` expired entries.
pub trait ExpirySweep {
    /// Returns how many entries were removed.
    fn cleanup_expired(&self, budget: usize) -> usize;
}

impl<K, V> ExpirySweep for Shard<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn cleanup_expired(&self, budget: usize) -> usize {
        Shard::cleanup_expired(self, budget)
    }
}

// == Sweep ==
/// Runs one bounded sweep over every shard in order.
///
/// A shard that panics is logged and skipped; the remaining shards are
/// still swept. Returns the total number of entries removed.
pub fn sweep_shards<S: ExpirySweep>(shards: &[S], budget: usize) -> usize {
    let mut removed = 0;
    for (index, shard) in shards.iter().enumerate() {
        match panic::catch_unwind(AssertUnwindSafe(|| shard.cleanup_expired(budget))) {
            Ok(count) => removed += count,
            Err(payload) => {
                error!(shard = index, "Expiry sweep failed: {}", panic_message(&*payload));
            }
        }
    }
    removed
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

// == Janitor ==
/// Handle to a running janitor task.
///
/// Call [`Janitor::stop`] to shut it down and wait for the current pass to
/// finish. Dropping the handle aborts the task instead.
#[derive(Debug)]
pub struct Janitor {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Janitor {
    /// Spawns a janitor for `cache` on the current tokio runtime.
    ///
    /// # Arguments
    /// * `cache` - Shared cache to sweep
    /// * `interval` - Time between passes (the first pass runs after one interval)
    /// * `budget` - Entries inspected per shard per pass
    ///
    /// # Example
    /// ```ignore
    /// let cache = Arc::new(ShardedCache::<String, String>::new(1000, 16)?);
    /// let mut janitor = Janitor::spawn(cache.clone(), Duration::from_secs(1), 20);
    /// // Later, during shutdown:
    /// janitor.stop().await;
    /// ```
    pub fn spawn<K, V>(cache: Arc<ShardedCache<K, V>>, interval: Duration, budget: usize) -> Self
    where
        K: Hash + Eq + Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            info!(
                "Starting janitor: {} shards every {:?}, budget {}",
                cache.shard_count(),
                interval,
                budget
            );

            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let removed = sweep_shards(cache.shards(), budget);
                        if removed > 0 {
                            info!("Janitor: removed {} expired entries", removed);
                        } else {
                            debug!("Janitor: no expired entries found");
                        }
                    }
                }
            }

            info!("Janitor stopped");
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Signals the task to stop and waits for it to exit.
    ///
    /// Calling it again is a no-op.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Janitor task ended abnormally: {}", e);
                }
            }
        }
    }

    /// True once the task has stopped or been stopped.
    pub fn is_stopped(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
