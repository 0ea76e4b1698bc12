//! Transient Map Collection
//!
//! A transaction-local, multi-valued map. Keys are case-insensitive and are
//! stored lowercased. Nothing here ever reaches the storage engine.

use crate::collection::names::CollectionName;
use std::collections::HashMap;

/// A transaction-scoped collection such as `TX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapCollection {
    name: CollectionName,
    data: HashMap<String, Vec<String>>,
}

impl MapCollection {
    /// Creates an empty collection.
    pub fn new(name: CollectionName) -> Self {
        Self {
            name,
            data: HashMap::new(),
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> CollectionName {
        self.name
    }

    /// Returns every value stored under `key`.
    pub fn get(&self, key: &str) -> &[String] {
        self.data
            .get(&key.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the first value stored under `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    /// Replaces the values stored under `key`.
    pub fn set(&mut self, key: &str, values: Vec<String>) {
        self.data.insert(key.to_lowercase(), values);
    }

    /// Replaces the values under `key` with a single value.
    pub fn set_one(&mut self, key: &str, value: impl Into<String>) {
        self.set(key, vec![value.into()]);
    }

    /// Removes `key`. Returns true if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.data.remove(&key.to_lowercase()).is_some()
    }

    /// Returns every `(key, value)` pair, sorted by key.
    pub fn find_all(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .data
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.clone(), v.clone())))
            .collect();
        pairs.sort();
        pairs
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no key is set.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the allocated capacity of the backing map.
    pub(crate) fn capacity(&self) -> usize {
        self.data.capacity()
    }
}
