//! Collection Module
//!
//! Collections are the in-transaction view rules use to read and mutate
//! state. There are two variants:
//!
//! - **Persistent** ([`PersistentCollection`]): forwards to the shared storage
//!   engine, scoped to one instance key. Survives the transaction.
//! - **Transient** ([`MapCollection`]): an ordinary map owned by the
//!   transaction and discarded with it.
//!
//! A transaction hands out a [`CollectionHandle`] for a [`CollectionName`];
//! callers dispatch on the variant.

pub mod map;
pub mod names;
pub mod persistent;

// Re-export commonly used types
pub use map::MapCollection;
pub use names::{CollectionName, UnknownCollection};
pub use persistent::PersistentCollection;

/// The variant a transaction resolves a collection name to.
#[derive(Debug)]
pub enum CollectionHandle<'a> {
    /// Backed by the storage engine
    Persistent(PersistentCollection),
    /// Owned by the transaction
    Map(&'a mut MapCollection),
    /// Known name with no editable backing in this transaction, e.g. a
    /// persistent collection whose instance key was never bound
    Unavailable(CollectionName),
}
