//! Persistent Engine Contract
//!
//! Every storage backend that holds collection state across transactions
//! implements [`PersistentEngine`]. The WAF never talks to a concrete backend
//! directly: it asks an [`EngineProvider`] for a fresh engine, calls
//! [`PersistentEngine::init`] once, shares it with every transaction, and
//! calls [`PersistentEngine::close`] once at shutdown.
//!
//! ## Addressing
//!
//! ```text
//! (collection, key, field)  ->  value
//!      │         │     │
//!      │         │     └── named attribute, e.g. "score"
//!      │         └──────── instance, e.g. a session id or an IP address
//!      └────────────────── bucket, e.g. "SESSION", "IP", "GLOBAL"
//! ```
//!
//! Values are strings. Numeric fields additionally support atomic deltas
//! through [`PersistentEngine::sum`].

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by storage backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend could not acquire the resources it needs
    #[error("engine initialization failed: {0}")]
    Init(String),

    /// `init` was called on an engine that is already running
    #[error("engine is already initialized")]
    AlreadyInitialized,

    /// The engine has been closed
    #[error("engine is closed")]
    Closed,

    /// A shard lock was poisoned by a panicking writer
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Any other backend-specific failure (I/O, connection loss, ...)
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// The storage contract shared by all persistence backends.
///
/// Implementations must be safe to call from many transactions at once.
/// [`sum`](PersistentEngine::sum) in particular must be linearizable per
/// `(collection, key, field)`: concurrent deltas are never lost.
pub trait PersistentEngine: Send + Sync {
    /// Prepares backend resources (connections, background tasks).
    ///
    /// An engine whose `init` failed must not be used.
    fn init(&self) -> StorageResult<()>;

    /// Releases backend resources and stops background maintenance.
    ///
    /// Must not delete stored data and must not block indefinitely.
    fn close(&self) -> StorageResult<()>;

    /// Atomically adds `delta` to a numeric field.
    ///
    /// A missing or non-numeric current value counts as 0.
    fn sum(&self, collection: &str, key: &str, field: &str, delta: i64) -> StorageResult<()>;

    /// Reads a single field. Missing fields and instances yield an empty string.
    fn get(&self, collection: &str, key: &str, field: &str) -> StorageResult<String>;

    /// Reads every user-visible field of an instance.
    ///
    /// Returns `None` when the instance does not exist. Internal metadata is
    /// never part of the returned map.
    fn all(&self, collection: &str, key: &str) -> StorageResult<Option<HashMap<String, String>>>;

    /// Stores a value, creating the instance if needed.
    fn set(&self, collection: &str, key: &str, field: &str, value: &str) -> StorageResult<()>;

    /// Sets the time-to-live of an instance, in seconds.
    ///
    /// Only the first call for an instance takes effect; later calls are
    /// no-ops so a rule cannot keep pushing an attacker-controlled timeout.
    fn set_ttl(&self, collection: &str, key: &str, ttl_secs: u64) -> StorageResult<()>;

    /// Deletes a field. Missing fields are ignored.
    fn remove(&self, collection: &str, key: &str, field: &str) -> StorageResult<()>;
}

/// Factory producing a new, independent engine on every call.
///
/// Configurations carry the provider rather than an engine so that cloned
/// configurations never end up sharing one engine instance.
pub type EngineProvider =
    Arc<dyn Fn() -> StorageResult<Box<dyn PersistentEngine>> + Send + Sync>;

/// Null-object backend used when persistence is disabled.
///
/// Every operation succeeds and nothing is ever stored.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEngine;

impl PersistentEngine for NoopEngine {
    fn init(&self) -> StorageResult<()> {
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    fn sum(&self, _collection: &str, _key: &str, _field: &str, _delta: i64) -> StorageResult<()> {
        Ok(())
    }

    fn get(&self, _collection: &str, _key: &str, _field: &str) -> StorageResult<String> {
        Ok(String::new())
    }

    fn all(&self, _collection: &str, _key: &str) -> StorageResult<Option<HashMap<String, String>>> {
        Ok(None)
    }

    fn set(&self, _collection: &str, _key: &str, _field: &str, _value: &str) -> StorageResult<()> {
        Ok(())
    }

    fn set_ttl(&self, _collection: &str, _key: &str, _ttl_secs: u64) -> StorageResult<()> {
        Ok(())
    }

    fn remove(&self, _collection: &str, _key: &str, _field: &str) -> StorageResult<()> {
        Ok(())
    }
}
