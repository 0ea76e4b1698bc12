//! Background Expiry Sweeper
//!
//! This module implements the task that periodically removes collection
//! instances whose timeout has elapsed. Reads already hide expired instances
//! ("lazy expiry"), but an instance that is never touched again would stay in
//! memory forever without this sweeper ("active expiry").
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps for a fixed interval (default: 1s)
//! 2. Wakes up and drains each shard's due deadlines
//! 3. Removes them, one short write lock per instance
//! 4. Logs statistics about the cleanup
//!
//! A cleanup pass has no await points, so a stop signal is only ever observed
//! between passes. Stopping is therefore safe at any moment and never
//! interrupts a half-finished pass.

use crate::storage::memory::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for expiry in the in-memory engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryConfig {
    /// Interval between sweeps (default: 1s)
    pub sweep_interval: Duration,

    /// Timeout given to newly created instances (default: none)
    pub default_timeout: Option<Duration>,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            default_timeout: None,
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    /// The spawned task
    task: JoinHandle<()>,
}

impl ExpirySweeper {
    /// Starts the sweeper on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, like `tokio::spawn`.
    pub fn start(store: Arc<MemoryStore>, config: ExpiryConfig) -> Self {
        Self::start_on(&Handle::current(), store, config)
    }

    /// Starts the sweeper on the given runtime.
    pub fn start_on(handle: &Handle, store: Arc<MemoryStore>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = handle.spawn(sweeper_loop(store, config.sweep_interval, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx, task }
    }

    /// Signals the sweeper to stop. Returns immediately.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background expiry sweeper stopped");
        }
    }

    /// Returns true once the sweeper task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the sweeper and waits up to `timeout` for the task to exit.
    ///
    /// # Returns
    ///
    /// Returns `true` if the task exited within `timeout`.
    pub async fn join(mut self, timeout: Duration) -> bool {
        self.stop();

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Expiry sweeper task failed");
                true
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Expiry sweeper did not stop in time"
                );
                false
            }
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    store: Arc<MemoryStore>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        match store.cleanup_expired() {
            Ok(0) => {}
            Ok(expired) => {
                debug!(
                    expired = expired,
                    instances_remaining = store.len(),
                    "Expired collection instances cleaned up"
                );
            }
            // Skip this cycle; the next one retries.
            Err(e) => warn!(error = %e, "Expiry sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::PersistentEngine;
    use crate::storage::memory::MemoryEngine;

    fn fast_config() -> ExpiryConfig {
        ExpiryConfig {
            sweep_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_instances() {
        let store = Arc::new(MemoryStore::default());

        for i in 0..10 {
            let key = format!("session{}", i);
            store.set("SESSION", &key, "score", "1").unwrap();
            store.set_ttl("SESSION", &key, Duration::from_millis(30)).unwrap();
        }
        store.set("GLOBAL", "global", "score", "1").unwrap();
        assert_eq!(store.len(), 11);

        let _sweeper = ExpirySweeper::start(Arc::clone(&store), fast_config());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("GLOBAL", "global", "score").unwrap(), "1");
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let store = Arc::new(MemoryStore::default());

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&store), fast_config());
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        store.set("IP", "10.0.0.1", "hits", "1").unwrap();
        store.set_ttl("IP", "10.0.0.1", Duration::from_millis(50)).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        // Nobody swept it, but reads already hide it
        assert_eq!(store.len(), 1);
        assert_eq!(store.all("IP", "10.0.0.1").unwrap(), None);
    }

    #[tokio::test]
    async fn test_join_after_stop() {
        let store = Arc::new(MemoryStore::default());
        let sweeper = ExpirySweeper::start(store, fast_config());

        sweeper.stop();
        sweeper.stop();
        assert!(sweeper.join(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_stop_before_first_tick() {
        let store = Arc::new(MemoryStore::default());
        let config = ExpiryConfig {
            sweep_interval: Duration::from_secs(3600),
            ..Default::default()
        };

        let sweeper = ExpirySweeper::start(store, config);
        // The long sleep must not delay shutdown
        assert!(sweeper.join(Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn test_engine_expires_after_ttl() {
        let engine = MemoryEngine::with_config(ExpiryConfig {
            sweep_interval: Duration::from_millis(50),
            ..Default::default()
        });
        engine.init().unwrap();

        engine.set("SESSION", "abc", "score", "5").unwrap();
        engine.set_ttl("SESSION", "abc", 1).unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let all = engine.all("SESSION", "abc").unwrap().unwrap();
        assert_eq!(all.get("score").map(String::as_str), Some("5"));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(engine.all("SESSION", "abc").unwrap(), None);
        assert!(engine.store().is_empty());

        engine.close().unwrap();
        assert!(engine.join_sweeper(Duration::from_secs(1)).await);
    }
}
