//! Editable Collection Names
//!
//! The fixed set of collections rules may mutate. `TX` lives and dies with a
//! transaction; the others are persistent and resolve to an instance in the
//! storage engine once a key is bound.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a name is not one of the editable collections.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown collection '{0}', expected one of TX, USER, GLOBAL, RESOURCE, SESSION, IP")]
pub struct UnknownCollection(pub String);

/// A collection rules can read and mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionName {
    /// Transaction-scoped variables
    Tx,
    /// Per-user state
    User,
    /// State shared by every client
    Global,
    /// Per-resource (e.g. per-URL) state
    Resource,
    /// Per-session state
    Session,
    /// Per-client-address state
    Ip,
}

impl CollectionName {
    /// Every editable collection.
    pub const ALL: [CollectionName; 6] = [
        CollectionName::Tx,
        CollectionName::User,
        CollectionName::Global,
        CollectionName::Resource,
        CollectionName::Session,
        CollectionName::Ip,
    ];

    /// Returns the canonical (uppercase) name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Tx => "TX",
            CollectionName::User => "USER",
            CollectionName::Global => "GLOBAL",
            CollectionName::Resource => "RESOURCE",
            CollectionName::Session => "SESSION",
            CollectionName::Ip => "IP",
        }
    }

    /// Returns true if the collection is backed by the storage engine.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, CollectionName::Tx)
    }
}

impl FromStr for CollectionName {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectionName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCollection(s.to_string()))
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
