//! Transactions
//!
//! A [`Transaction`] is one request/response inspection. It owns its
//! transient state (the `TX` collection, the transformation cache, the keys
//! its persistent collections are bound to) exclusively, so none of it needs
//! locking. Persistent collections go through the shared engine.
//!
//! Closing or dropping a transaction hands its state back to the pool, which
//! wipes it before anyone else can see it.

use crate::collection::{CollectionHandle, CollectionName, MapCollection, PersistentCollection};
use crate::storage::PersistentEngine;
use crate::waf::pool::{
    TransactionPool, TransactionState, TransformationKey, TransformationValue,
};
use crate::waf::WafError;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Instance key GLOBAL is bound to in every transaction.
pub const GLOBAL_INSTANCE_KEY: &str = "global";

/// One inspection unit, drawn from the WAF's pool.
pub struct Transaction {
    id: u64,
    state: Box<TransactionState>,
    engine: Arc<dyn PersistentEngine>,
    pool: Arc<TransactionPool>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("tx_vars", &self.state.tx.len())
            .field("cached_transformations", &self.state.transformation_cache.len())
            .field("bound_keys", &self.state.bound_keys)
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(
        id: u64,
        engine: Arc<dyn PersistentEngine>,
        pool: Arc<TransactionPool>,
    ) -> Self {
        let mut state = pool.acquire();
        state
            .bound_keys
            .insert(CollectionName::Global, GLOBAL_INSTANCE_KEY.to_string());

        debug!(tx_id = id, "Transaction started");

        Self {
            id,
            state,
            engine,
            pool,
        }
    }

    /// Returns the transaction id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Binds a persistent collection to an instance, e.g. SESSION to a session id.
    ///
    /// Rebinding replaces the previous key for the rest of the transaction.
    pub fn init_collection(
        &mut self,
        name: CollectionName,
        key: impl Into<String>,
    ) -> Result<(), WafError> {
        if !name.is_persistent() {
            return Err(WafError::TransientCollection(name));
        }

        let key = key.into();
        debug!(tx_id = self.id, collection = %name, key = %key, "Collection bound");
        self.state.bound_keys.insert(name, key);
        Ok(())
    }

    /// Records the client address and binds IP to it.
    pub fn process_connection(&mut self, client_ip: &str) {
        self.state
            .bound_keys
            .insert(CollectionName::Ip, client_ip.to_string());
    }

    /// Returns the key `name` is bound to, if any.
    pub fn bound_key(&self, name: CollectionName) -> Option<&str> {
        self.state.bound_keys.get(&name).map(String::as_str)
    }

    /// Returns the persistent view of `name`, if it is bound.
    pub fn persistent(&self, name: CollectionName) -> Option<PersistentCollection> {
        if !name.is_persistent() {
            return None;
        }
        self.bound_key(name)
            .map(|key| PersistentCollection::new(Arc::clone(&self.engine), name, key))
    }

    /// Returns the TX collection.
    pub fn tx_collection(&self) -> &MapCollection {
        &self.state.tx
    }

    /// Returns the TX collection for writing.
    pub fn tx_collection_mut(&mut self) -> &mut MapCollection {
        &mut self.state.tx
    }

    /// Resolves `name` to the variant backing it in this transaction.
    pub fn collection_mut(&mut self, name: CollectionName) -> CollectionHandle<'_> {
        if name == CollectionName::Tx {
            return CollectionHandle::Map(&mut self.state.tx);
        }
        match self.persistent(name) {
            Some(col) => CollectionHandle::Persistent(col),
            None => CollectionHandle::Unavailable(name),
        }
    }

    /// Reads the first value of `name.key`; `None` when unset or empty.
    ///
    /// Backend failures are logged and read as unset.
    pub fn lookup(&self, name: CollectionName, key: &str) -> Option<String> {
        let value = if name == CollectionName::Tx {
            self.state.tx.first(key).map(str::to_string)
        } else {
            match self.persistent(name)?.get(key) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(
                        tx_id = self.id,
                        collection = %name,
                        key = key,
                        error = %e,
                        "Persistent lookup failed"
                    );
                    None
                }
            }
        };
        value.filter(|v| !v.is_empty())
    }

    /// Stores a transformation result for the rest of the transaction.
    pub fn cache_transformation(&mut self, key: TransformationKey, value: TransformationValue) {
        self.state.transformation_cache.insert(key, value);
    }

    /// Returns a cached transformation result.
    pub fn cached_transformation(&self, key: &TransformationKey) -> Option<&TransformationValue> {
        self.state.transformation_cache.get(key)
    }

    /// Returns the number of cached transformation results.
    pub fn cached_transformations(&self) -> usize {
        self.state.transformation_cache.len()
    }

    /// Ends the transaction and returns its state to the pool.
    pub fn close(self) {
        // Drop does the work
    }

    #[cfg(test)]
    pub(crate) fn cache_capacities(&self) -> (usize, usize) {
        (self.state.tx.capacity(), self.state.transformation_cache.capacity())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let state = std::mem::take(&mut self.state);
        self.pool.release(state);
        debug!(tx_id = self.id, "Transaction closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryEngine, NoopEngine};

    fn pool() -> Arc<TransactionPool> {
        Arc::new(TransactionPool::new(8))
    }

    fn key(arg_index: usize) -> TransformationKey {
        TransformationKey {
            arg_index,
            transformations_id: 1,
        }
    }

    #[test]
    fn test_global_is_bound_by_default() {
        let tx = Transaction::new(1, Arc::new(NoopEngine), pool());

        assert_eq!(tx.bound_key(CollectionName::Global), Some(GLOBAL_INSTANCE_KEY));
        assert!(tx.persistent(CollectionName::Global).is_some());
        assert!(tx.persistent(CollectionName::Session).is_none());
        assert!(tx.persistent(CollectionName::Tx).is_none());
    }

    #[test]
    fn test_init_collection() {
        let mut tx = Transaction::new(1, Arc::new(NoopEngine), pool());

        tx.init_collection(CollectionName::Session, "abc").unwrap();
        assert_eq!(tx.bound_key(CollectionName::Session), Some("abc"));

        let err = tx.init_collection(CollectionName::Tx, "abc").unwrap_err();
        assert!(matches!(err, WafError::TransientCollection(CollectionName::Tx)));
    }

    #[test]
    fn test_collection_variants() {
        let mut tx = Transaction::new(1, Arc::new(NoopEngine), pool());
        tx.process_connection("192.0.2.7");

        assert!(matches!(tx.collection_mut(CollectionName::Tx), CollectionHandle::Map(_)));
        match tx.collection_mut(CollectionName::Ip) {
            CollectionHandle::Persistent(col) => assert_eq!(col.key(), "192.0.2.7"),
            other => panic!("unexpected handle {:?}", other),
        }
        assert!(matches!(
            tx.collection_mut(CollectionName::Resource),
            CollectionHandle::Unavailable(CollectionName::Resource)
        ));
    }

    #[test]
    fn test_lookup_reads_both_variants() {
        let engine = Arc::new(MemoryEngine::new());
        engine.store().set("SESSION", "abc", "hits", "4").unwrap();
        let mut tx = Transaction::new(1, engine, pool());
        tx.init_collection(CollectionName::Session, "abc").unwrap();
        tx.tx_collection_mut().set_one("score", "2");

        assert_eq!(tx.lookup(CollectionName::Tx, "SCORE"), Some("2".to_string()));
        assert_eq!(tx.lookup(CollectionName::Session, "Hits"), Some("4".to_string()));
        assert_eq!(tx.lookup(CollectionName::Session, "nope"), None);
        assert_eq!(tx.lookup(CollectionName::User, "hits"), None);
    }

    #[test]
    fn test_transformation_cache() {
        let mut tx = Transaction::new(1, Arc::new(NoopEngine), pool());
        let value = TransformationValue {
            arg: "select".into(),
            changed: true,
        };

        tx.cache_transformation(key(0), value.clone());
        assert_eq!(tx.cached_transformation(&key(0)), Some(&value));
        assert_eq!(tx.cached_transformation(&key(1)), None);
        assert_eq!(tx.cached_transformations(), 1);
    }

    #[test]
    fn test_close_returns_state_to_pool() {
        let pool = pool();
        let tx = Transaction::new(1, Arc::new(NoopEngine), Arc::clone(&pool));

        assert_eq!(pool.idle(), 0);
        tx.close();
        assert_eq!(pool.idle(), 1);
    }
}
