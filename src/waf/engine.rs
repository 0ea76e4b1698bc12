//! WAF Owner
//!
//! [`Waf`] ties configuration, the persistent engine and the transaction
//! pool together. It builds its engine from the configured provider exactly
//! once, shares it with every transaction, and closes it once on shutdown.

use crate::collection::CollectionName;
use crate::storage::{NoopEngine, PersistentEngine, StorageError};
use crate::waf::config::WafConfig;
use crate::waf::pool::{PoolStats, TransactionPool};
use crate::waf::transaction::Transaction;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised by the WAF and its transactions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WafError {
    /// The persistent engine could not be built or initialized
    #[error("persistence engine error: {0}")]
    Engine(#[from] StorageError),

    /// Only persistent collections can be bound to an instance key
    #[error("collection {0} is transient and cannot be bound to a key")]
    TransientCollection(CollectionName),
}

/// The WAF instance: owner of the persistent engine and transaction pool.
pub struct Waf {
    engine: Arc<dyn PersistentEngine>,
    pool: Arc<TransactionPool>,
    persistence_enabled: bool,
    engine_closed: AtomicBool,
    next_tx_id: AtomicU64,
}

impl fmt::Debug for Waf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waf")
            .field("persistence_enabled", &self.persistence_enabled)
            .field("engine_closed", &self.engine_closed.load(Ordering::Relaxed))
            .field("pool", &self.pool.stats())
            .finish()
    }
}

impl Waf {
    /// Builds a WAF from `config`.
    ///
    /// With a provider configured, a new engine is requested and initialized;
    /// any failure aborts construction. Without one, persistence is a no-op.
    pub fn new(config: WafConfig) -> Result<Self, WafError> {
        let persistence_enabled = config.engine_provider().is_some();
        let engine: Arc<dyn PersistentEngine> = match config.engine_provider() {
            Some(provider) => {
                let engine: Arc<dyn PersistentEngine> = Arc::from(provider()?);
                engine.init()?;
                engine
            }
            None => Arc::new(NoopEngine),
        };

        info!(
            persistence = persistence_enabled,
            pool_capacity = config.pool_capacity(),
            "WAF initialized"
        );

        Ok(Self {
            engine,
            pool: Arc::new(TransactionPool::new(config.pool_capacity())),
            persistence_enabled,
            engine_closed: AtomicBool::new(false),
            next_tx_id: AtomicU64::new(1),
        })
    }

    /// Starts a new transaction backed by pooled state.
    pub fn new_transaction(&self) -> Transaction {
        let id = self.next_tx_id.fetch_add(1, Ordering::Relaxed);
        Transaction::new(id, Arc::clone(&self.engine), Arc::clone(&self.pool))
    }

    /// Returns the shared persistent engine.
    pub fn engine(&self) -> &Arc<dyn PersistentEngine> {
        &self.engine
    }

    /// Returns true when a provider was configured.
    pub fn persistence_enabled(&self) -> bool {
        self.persistence_enabled
    }

    /// Returns transaction pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Closes the persistent engine.
    ///
    /// Stored data and open transactions are untouched. A failed close is
    /// returned and may be retried. Once a close has succeeded, later calls
    /// return [`StorageError::Closed`] without reaching the engine.
    pub fn close_persistent_engine(&self) -> Result<(), StorageError> {
        if self.engine_closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }

        self.engine.close().map_err(|e| {
            warn!(error = %e, "Persistence engine failed to close");
            e
        })?;
        self.engine_closed.store(true, Ordering::Release);
        info!("Persistence engine closed");
        Ok(())
    }
}
