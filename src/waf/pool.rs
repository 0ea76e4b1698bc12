//! Transaction Pool
//!
//! Transactions are expensive enough to recycle. The pool keeps released
//! transaction state around and hands it out again, with one hard rule:
//!
//! **Nothing a transaction cached may be visible to the next occupant.**
//!
//! ## State Machine
//!
//! ```text
//! ┌──────────┐ acquire ┌──────────┐  close/drop  ┌──────────┐
//! │ Created  │ ──────> │  InUse   │ ───────────> │ Released │
//! │ (empty)  │         │ (caches  │              │ (caches  │
//! └──────────┘         │  fill)   │              │ replaced)│
//!      ▲               └──────────┘              └────┬─────┘
//!      │                    reset on acquire          │
//!      └──────────────────────  pool  <───────────────┘
//! ```
//!
//! Caches are replaced with freshly allocated maps both on release and on
//! acquire. They are never cleared in place, so no backing storage from a
//! previous occupant survives.

use crate::collection::{CollectionName, MapCollection};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Identifies a cached transformation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformationKey {
    /// Position of the argument in the variable being inspected
    pub arg_index: usize,
    /// Identifier of the transformation chain applied to it
    pub transformations_id: u64,
}

/// A cached transformation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformationValue {
    /// The transformed argument
    pub arg: String,
    /// Whether any transformation changed the input
    pub changed: bool,
}

/// Everything a transaction owns that must not outlive it.
#[derive(Debug)]
pub(crate) struct TransactionState {
    pub(crate) tx: MapCollection,
    pub(crate) transformation_cache: HashMap<TransformationKey, TransformationValue>,
    pub(crate) bound_keys: HashMap<CollectionName, String>,
}

impl Default for TransactionState {
    fn default() -> Self {
        Self {
            tx: MapCollection::new(CollectionName::Tx),
            transformation_cache: HashMap::new(),
            bound_keys: HashMap::new(),
        }
    }
}

impl TransactionState {
    /// Replaces every cache with a fresh, unallocated one.
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// States allocated because the pool was empty
    pub created: u64,
    /// States handed out again from the pool
    pub reused: u64,
    /// States currently idle in the pool
    pub idle: usize,
}

/// A bounded pool of released transaction state.
#[derive(Debug)]
pub struct TransactionPool {
    free: Mutex<Vec<Box<TransactionState>>>,
    capacity: usize,
    created: AtomicU64,
    reused: AtomicU64,
}

impl TransactionPool {
    /// Creates a pool keeping at most `capacity` idle states.
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Hands out empty state, reusing an idle one when available.
    pub(crate) fn acquire(&self) -> Box<TransactionState> {
        // The free list only ever holds reset states, so a poisoned lock is safe to recover.
        let pooled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match pooled {
            Some(mut state) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                state.reset();
                state
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                Box::default()
            }
        }
    }

    /// Takes state back. It is reset before it becomes visible to the pool.
    pub(crate) fn release(&self, mut state: Box<TransactionState>) {
        state.reset();

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(state);
        } else {
            trace!(capacity = self.capacity, "Transaction pool full, dropping state");
        }
    }

    /// Returns the number of idle states.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns the maximum number of idle states kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            idle: self.idle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirty(state: &mut TransactionState) {
        state.tx.set_one("score", "5");
        state.transformation_cache.insert(
            TransformationKey {
                arg_index: 0,
                transformations_id: 1,
            },
            TransformationValue {
                arg: "bla".into(),
                changed: true,
            },
        );
        state.bound_keys.insert(CollectionName::Session, "abc".into());
    }

    #[test]
    fn test_acquire_creates_then_reuses() {
        let pool = TransactionPool::new(4);

        let state = pool.acquire();
        pool.release(state);
        let _state = pool.acquire();

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.idle, 0);
    }

    #[test]
    fn test_released_state_is_empty_and_unallocated() {
        let pool = TransactionPool::new(4);

        let mut state = pool.acquire();
        dirty(&mut state);
        pool.release(state);

        let state = pool.acquire();
        assert!(state.tx.is_empty());
        assert!(state.transformation_cache.is_empty());
        assert!(state.bound_keys.is_empty());
        assert_eq!(state.tx.capacity(), 0);
        assert_eq!(state.transformation_cache.capacity(), 0);
    }

    #[test]
    fn test_capacity_bounds_idle_states() {
        let pool = TransactionPool::new(2);

        let states: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        for state in states {
            pool.release(state);
        }

        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn test_zero_capacity_never_pools() {
        let pool = TransactionPool::new(0);

        pool.release(pool.acquire());
        assert_eq!(pool.idle(), 0);
        let _ = pool.acquire();
        assert_eq!(pool.stats().created, 2);
    }
}
