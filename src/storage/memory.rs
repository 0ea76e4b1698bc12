//! Reference In-Memory Persistence Engine
//!
//! This module implements the default [`PersistentEngine`] backend. It keeps
//! every collection instance in process memory and relies on a background
//! [`ExpirySweeper`] to drop instances whose timeout has elapsed.
//!
//! It is illustrative rather than production storage: nothing survives a
//! process restart.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instances are spread over 64 shards so that transactions
//!    touching different sessions or IPs rarely contend.
//! 2. **One Record Per Instance**: A `(collection, key)` pair maps to an
//!    [`Instance`] holding explicit [`Metadata`] plus a plain field map.
//! 3. **Lazy + Active Expiry**: Reads treat an expired instance as absent; the
//!    sweeper is what actually deletes it.
//! 4. **Close Never Deletes**: `close` only signals the sweeper. Data deletion
//!    belongs to the sweeper alone.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       MemoryStore                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `sum` holds the shard write lock for its whole read-modify-write, which
//! makes concurrent deltas on the same instance linearizable.
//!
//! Each shard also keeps its expiry deadlines in a separate ordered index. A
//! sweep pass drains the due deadlines from that index and then removes each
//! instance under its own short write lock. It never scans the instance map.

use crate::storage::engine::{EngineProvider, PersistentEngine, StorageError, StorageResult};
use crate::storage::expiry::{ExpiryConfig, ExpirySweeper};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Number of shards for the store.
const NUM_SHARDS: usize = 64;

/// Identifies one collection instance, e.g. `("SESSION", "abc123")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstanceKey {
    collection: String,
    key: String,
}

impl InstanceKey {
    fn new(collection: &str, key: &str) -> Self {
        Self {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }
}

/// Bookkeeping kept for every collection instance.
///
/// `update_rate` is informational: an integer approximation of updates per
/// second since creation. Nothing else depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// When the instance was created
    pub created_at: Instant,
    /// True until the first update after creation
    pub is_new: bool,
    /// When the instance was last written (None until the first update)
    pub last_updated_at: Option<Instant>,
    /// Number of writes since creation
    pub update_count: u64,
    /// `update_count / elapsed seconds`, refreshed only once a second has passed
    pub update_rate: u64,
    /// When the instance expires (None = never)
    pub expires_at: Option<Instant>,
    /// Set once an explicit TTL has been applied
    pub ttl_locked: bool,
}

impl Metadata {
    fn new(now: Instant, default_timeout: Option<Duration>) -> Self {
        Self {
            created_at: now,
            is_new: true,
            last_updated_at: None,
            update_count: 0,
            update_rate: 0,
            expires_at: default_timeout.and_then(|ttl| now.checked_add(ttl)),
            ttl_locked: false,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.update_count += 1;
        self.is_new = false;
        self.last_updated_at = Some(now);

        let elapsed = now.saturating_duration_since(self.created_at).as_secs();
        if elapsed > 0 {
            self.update_rate = self.update_count / elapsed;
        }
    }

    /// Checks whether the instance has expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Checks whether the instance has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

/// A stored collection instance.
#[derive(Debug, Clone)]
struct Instance {
    meta: Metadata,
    fields: HashMap<String, String>,
}

impl Instance {
    fn new(now: Instant, default_timeout: Option<Duration>) -> Self {
        Self {
            meta: Metadata::new(now, default_timeout),
            fields: HashMap::new(),
        }
    }
}

/// A single shard containing a portion of the instances.
#[derive(Debug)]
struct Shard {
    data: RwLock<HashMap<InstanceKey, Instance>>,
    /// Expiry deadlines, possibly stale. Removal always re-checks the instance.
    deadlines: Mutex<BTreeMap<Instant, Vec<InstanceKey>>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            deadlines: Mutex::new(BTreeMap::new()),
        }
    }

    fn schedule(&self, deadline: Instant, key: InstanceKey) -> StorageResult<()> {
        let mut deadlines = self.deadlines.lock().map_err(|_| StorageError::LockPoisoned)?;
        deadlines.entry(deadline).or_default().push(key);
        Ok(())
    }

    /// Removes and returns every key whose deadline is at or before `now`.
    fn take_due(&self, now: Instant) -> StorageResult<Vec<InstanceKey>> {
        let mut deadlines = self.deadlines.lock().map_err(|_| StorageError::LockPoisoned)?;
        let mut due = Vec::new();
        while let Some(entry) = deadlines.first_entry() {
            if *entry.key() > now {
                break;
            }
            due.extend(entry.remove());
        }
        Ok(due)
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Instances currently held (expired ones included until swept)
    pub instances: u64,
    /// Total write operations (set, sum, remove)
    pub writes: u64,
    /// Total instances removed by expiry
    pub expired: u64,
}

/// The sharded map behind [`MemoryEngine`], shared with the sweeper.
pub struct MemoryStore {
    shards: Vec<Shard>,
    default_timeout: Option<Duration>,
    instance_count: AtomicU64,
    write_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("shards", &self.shards.len())
            .field("instances", &self.instance_count.load(Ordering::Relaxed))
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MemoryStore {
    /// Creates an empty store. New instances get `default_timeout`, if any.
    pub fn new(default_timeout: Option<Duration>) -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::new()).collect();

        Self {
            shards,
            default_timeout,
            instance_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn get_shard(&self, key: &InstanceKey) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Runs `f` on a live instance under the shard write lock, creating it
    /// first if it is missing or expired.
    fn write_instance<R>(
        &self,
        collection: &str,
        key: &str,
        f: impl FnOnce(&mut Instance) -> R,
    ) -> StorageResult<R> {
        self.write_count.fetch_add(1, Ordering::Relaxed);

        let ikey = InstanceKey::new(collection, key);
        let shard = self.get_shard(&ikey);
        let default_timeout = self.default_timeout;
        let index_key = default_timeout.map(|_| ikey.clone());
        let mut data = shard.data.write().map_err(|_| StorageError::LockPoisoned)?;
        let now = Instant::now();

        let mut created = false;
        let instance = data.entry(ikey).or_insert_with(|| {
            created = true;
            Instance::new(now, default_timeout)
        });

        let fresh = if created {
            self.instance_count.fetch_add(1, Ordering::Relaxed);
            true
        } else if instance.meta.is_expired_at(now) {
            // Expired but not swept yet: start over.
            *instance = Instance::new(now, default_timeout);
            true
        } else {
            instance.meta.touch(now);
            false
        };

        if fresh {
            if let (Some(deadline), Some(index_key)) = (instance.meta.expires_at, index_key) {
                shard.schedule(deadline, index_key)?;
            }
        }

        Ok(f(instance))
    }

    /// Runs `f` on a live instance under the shard read lock.
    fn read_instance<R>(
        &self,
        collection: &str,
        key: &str,
        f: impl FnOnce(&Instance) -> R,
    ) -> StorageResult<Option<R>> {
        let ikey = InstanceKey::new(collection, key);
        let shard = self.get_shard(&ikey);
        let data = shard.data.read().map_err(|_| StorageError::LockPoisoned)?;

        Ok(data
            .get(&ikey)
            .filter(|instance| !instance.meta.is_expired())
            .map(f))
    }

    /// Reads one field; empty when missing.
    pub fn get(&self, collection: &str, key: &str, field: &str) -> StorageResult<String> {
        Ok(self
            .read_instance(collection, key, |i| i.fields.get(field).cloned())?
            .flatten()
            .unwrap_or_default())
    }

    /// Reads all fields of an instance.
    pub fn all(
        &self,
        collection: &str,
        key: &str,
    ) -> StorageResult<Option<HashMap<String, String>>> {
        self.read_instance(collection, key, |i| i.fields.clone())
    }

    /// Writes one field.
    pub fn set(&self, collection: &str, key: &str, field: &str, value: &str) -> StorageResult<()> {
        self.write_instance(collection, key, |i| {
            i.fields.insert(field.to_string(), value.to_string());
        })
    }

    /// Adds `delta` to a field and returns the new value.
    ///
    /// Missing or non-numeric values count as 0. The result saturates at the
    /// `i64` bounds.
    pub fn sum(&self, collection: &str, key: &str, field: &str, delta: i64) -> StorageResult<i64> {
        self.write_instance(collection, key, |i| {
            let current = i
                .fields
                .get(field)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);
            let new_value = current.saturating_add(delta);
            i.fields.insert(field.to_string(), new_value.to_string());
            new_value
        })
    }

    /// Applies a TTL to an existing instance unless one was applied before.
    ///
    /// # Returns
    ///
    /// Returns `true` if the TTL took effect.
    pub fn set_ttl(&self, collection: &str, key: &str, ttl: Duration) -> StorageResult<bool> {
        let ikey = InstanceKey::new(collection, key);
        let shard = self.get_shard(&ikey);
        let mut data = shard.data.write().map_err(|_| StorageError::LockPoisoned)?;
        let now = Instant::now();

        let instance = match data.get_mut(&ikey) {
            Some(instance) if !instance.meta.is_expired_at(now) && !instance.meta.ttl_locked => {
                instance
            }
            _ => return Ok(false),
        };

        instance.meta.expires_at = now.checked_add(ttl);
        instance.meta.ttl_locked = true;
        if let Some(deadline) = instance.meta.expires_at {
            shard.schedule(deadline, ikey)?;
        }
        Ok(true)
    }

    /// Removes one field. Missing instances are left untouched.
    pub fn remove(&self, collection: &str, key: &str, field: &str) -> StorageResult<()> {
        let ikey = InstanceKey::new(collection, key);
        let shard = self.get_shard(&ikey);
        let mut data = shard.data.write().map_err(|_| StorageError::LockPoisoned)?;
        let now = Instant::now();

        if let Some(instance) = data.get_mut(&ikey) {
            if !instance.meta.is_expired_at(now) && instance.fields.remove(field).is_some() {
                self.write_count.fetch_add(1, Ordering::Relaxed);
                instance.meta.touch(now);
            }
        }
        Ok(())
    }

    /// Returns a copy of an instance's metadata.
    pub fn metadata(&self, collection: &str, key: &str) -> StorageResult<Option<Metadata>> {
        self.read_instance(collection, key, |i| i.meta)
    }

    /// Deletes every expired instance.
    ///
    /// Due keys come from the per-shard deadline index, so the instance maps
    /// are never scanned. Each key is removed under its own short write lock,
    /// re-checking expiry first: the instance may have been rewritten since
    /// its deadline was recorded.
    ///
    /// # Returns
    ///
    /// Returns the number of instances that were removed.
    pub fn cleanup_expired(&self) -> StorageResult<u64> {
        let now = Instant::now();
        let mut cleaned = 0u64;

        for shard in &self.shards {
            for key in shard.take_due(now)? {
                let mut data = shard.data.write().map_err(|_| StorageError::LockPoisoned)?;
                let still_expired = data
                    .get(&key)
                    .map(|instance| instance.meta.is_expired_at(now))
                    .unwrap_or(false);
                if still_expired {
                    data.remove(&key);
                    cleaned += 1;
                }
            }
        }

        if cleaned > 0 {
            self.instance_count.fetch_sub(cleaned, Ordering::Relaxed);
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        Ok(cleaned)
    }

    /// Returns the approximate number of stored instances.
    pub fn len(&self) -> u64 {
        self.instance_count.load(Ordering::Relaxed)
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns store statistics.
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            instances: self.instance_count.load(Ordering::Relaxed),
            writes: self.write_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// The in-memory [`PersistentEngine`].
///
/// # Example
///
/// ```
/// use wafstate::storage::{MemoryEngine, PersistentEngine};
///
/// let engine = MemoryEngine::new();
/// engine.set("SESSION", "abc123", "score", "4").unwrap();
/// engine.sum("SESSION", "abc123", "score", 3).unwrap();
/// assert_eq!(engine.get("SESSION", "abc123", "score").unwrap(), "7");
/// ```
#[derive(Debug)]
pub struct MemoryEngine {
    store: Arc<MemoryStore>,
    config: ExpiryConfig,
    sweeper: Mutex<Option<ExpirySweeper>>,
    closed: AtomicBool,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an engine with the default expiry configuration.
    pub fn new() -> Self {
        Self::with_config(ExpiryConfig::default())
    }

    /// Creates an engine with a custom expiry configuration.
    pub fn with_config(config: ExpiryConfig) -> Self {
        Self {
            store: Arc::new(MemoryStore::new(config.default_timeout)),
            config,
            sweeper: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns a provider that builds a fresh engine on every call.
    pub fn provider(config: ExpiryConfig) -> EngineProvider {
        Arc::new(move || {
            let engine = MemoryEngine::with_config(config.clone());
            Ok(Box::new(engine) as Box<dyn PersistentEngine>)
        })
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Returns a copy of an instance's metadata.
    pub fn metadata(&self, collection: &str, key: &str) -> StorageResult<Option<Metadata>> {
        self.store.metadata(collection, key)
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Waits for the sweeper task to exit after `close`, up to `timeout`.
    ///
    /// # Returns
    ///
    /// Returns `true` if the sweeper has exited (or was never started).
    pub async fn join_sweeper(&self, timeout: Duration) -> bool {
        let sweeper = match self.sweeper.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => return false,
        };

        match sweeper {
            Some(sweeper) => sweeper.join(timeout).await,
            None => true,
        }
    }
}

impl PersistentEngine for MemoryEngine {
    fn init(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }

        let mut sweeper = self.sweeper.lock().map_err(|_| StorageError::LockPoisoned)?;
        if sweeper.is_some() {
            return Err(StorageError::AlreadyInitialized);
        }

        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            StorageError::Init(format!("expiry sweeper needs a tokio runtime: {}", e))
        })?;

        *sweeper = Some(ExpirySweeper::start_on(
            &handle,
            Arc::clone(&self.store),
            self.config.clone(),
        ));
        info!(
            shards = NUM_SHARDS,
            sweep_interval_ms = self.config.sweep_interval.as_millis() as u64,
            "In-memory persistence engine initialized"
        );
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed);
        }

        let guard = self.sweeper.lock().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(sweeper) = guard.as_ref() {
            sweeper.stop();
        }
        debug!(instances = self.store.len(), "In-memory persistence engine closed");
        Ok(())
    }

    fn sum(&self, collection: &str, key: &str, field: &str, delta: i64) -> StorageResult<()> {
        self.store.sum(collection, key, field, delta).map(|_| ())
    }

    fn get(&self, collection: &str, key: &str, field: &str) -> StorageResult<String> {
        self.store.get(collection, key, field)
    }

    fn all(&self, collection: &str, key: &str) -> StorageResult<Option<HashMap<String, String>>> {
        self.store.all(collection, key)
    }

    fn set(&self, collection: &str, key: &str, field: &str, value: &str) -> StorageResult<()> {
        self.store.set(collection, key, field, value)
    }

    fn set_ttl(&self, collection: &str, key: &str, ttl_secs: u64) -> StorageResult<()> {
        self.store
            .set_ttl(collection, key, Duration::from_secs(ttl_secs))
            .map(|_| ())
    }

    fn remove(&self, collection: &str, key: &str, field: &str) -> StorageResult<()> {
        self.store.remove(collection, key, field)
    }
}
