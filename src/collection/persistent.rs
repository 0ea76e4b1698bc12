//! Persistent Collection
//!
//! A thin proxy over the shared [`PersistentEngine`], scoped to one collection
//! instance. The instance key (a session id, a client address, ...) is bound
//! once per transaction; every call forwards to the engine with that key.
//! Field names are case-insensitive and are lowercased before they reach the
//! engine.

use crate::collection::names::CollectionName;
use crate::storage::{PersistentEngine, StorageResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A collection view backed by the storage engine.
#[derive(Clone)]
pub struct PersistentCollection {
    engine: Arc<dyn PersistentEngine>,
    name: CollectionName,
    key: String,
}

impl fmt::Debug for PersistentCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentCollection")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish()
    }
}

impl PersistentCollection {
    /// Binds `name` to the instance identified by `key`.
    pub fn new(
        engine: Arc<dyn PersistentEngine>,
        name: CollectionName,
        key: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            name,
            key: key.into(),
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> CollectionName {
        self.name
    }

    /// Returns the bound instance key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads a field; empty when unset.
    pub fn get(&self, field: &str) -> StorageResult<String> {
        self.engine
            .get(self.name.as_str(), &self.key, &field.to_lowercase())
    }

    /// Overwrites a field.
    pub fn set_one(&self, field: &str, value: &str) -> StorageResult<()> {
        self.engine
            .set(self.name.as_str(), &self.key, &field.to_lowercase(), value)
    }

    /// Atomically adds `delta` to a field.
    pub fn sum(&self, field: &str, delta: i64) -> StorageResult<()> {
        self.engine
            .sum(self.name.as_str(), &self.key, &field.to_lowercase(), delta)
    }

    /// Deletes a field.
    pub fn remove(&self, field: &str) -> StorageResult<()> {
        self.engine
            .remove(self.name.as_str(), &self.key, &field.to_lowercase())
    }

    /// Sets the instance TTL in seconds. Only the first call takes effect.
    pub fn set_ttl(&self, ttl_secs: u64) -> StorageResult<()> {
        self.engine.set_ttl(self.name.as_str(), &self.key, ttl_secs)
    }

    /// Returns every field of the instance; empty when it does not exist.
    pub fn find_all(&self) -> StorageResult<HashMap<String, String>> {
        Ok(self
            .engine
            .all(self.name.as_str(), &self.key)?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryEngine, NoopEngine};

    fn session(engine: &Arc<dyn PersistentEngine>, key: &str) -> PersistentCollection {
        PersistentCollection::new(Arc::clone(engine), CollectionName::Session, key)
    }

    #[test]
    fn test_forwards_with_bound_key() {
        let engine: Arc<dyn PersistentEngine> = Arc::new(MemoryEngine::new());
        let col = session(&engine, "abc");

        col.set_one("Score", "3").unwrap();
        col.sum("score", 2).unwrap();

        assert_eq!(col.get("SCORE").unwrap(), "5");
        assert_eq!(engine.get("SESSION", "abc", "score").unwrap(), "5");
    }

    #[test]
    fn test_instances_do_not_mix() {
        let engine: Arc<dyn PersistentEngine> = Arc::new(MemoryEngine::new());
        let alice = session(&engine, "alice");
        let bob = session(&engine, "bob");

        alice.set_one("flag", "1").unwrap();
        assert_eq!(bob.get("flag").unwrap(), "");
        assert!(bob.find_all().unwrap().is_empty());
        assert_eq!(alice.find_all().unwrap().len(), 1);
    }

    #[test]
    fn test_remove() {
        let engine: Arc<dyn PersistentEngine> = Arc::new(MemoryEngine::new());
        let col = session(&engine, "abc");

        col.set_one("flag", "1").unwrap();
        col.remove("FLAG").unwrap();
        assert_eq!(col.get("flag").unwrap(), "");
    }

    #[test]
    fn test_noop_backend() {
        let engine: Arc<dyn PersistentEngine> = Arc::new(NoopEngine);
        let col = session(&engine, "abc");

        col.set_one("flag", "1").unwrap();
        col.sum("count", 4).unwrap();
        col.set_ttl(10).unwrap();
        assert_eq!(col.get("flag").unwrap(), "");
        assert!(col.find_all().unwrap().is_empty());
    }
}
