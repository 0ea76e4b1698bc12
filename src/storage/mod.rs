//! Storage Module
//!
//! This module defines the persistence contract shared by every backend and
//! ships the reference in-memory backend with background expiry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │             dyn PersistentEngine (shared, Arc)              │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!        ┌───────┴───────┐              ┌───────┴───────┐
//!        │  NoopEngine   │              │ MemoryEngine  │
//!        │ (persistence  │              │  ┌─────────┐  │
//!        │   disabled)   │              │  │ Shards  │  │
//!        └───────────────┘              │  └────▲────┘  │
//!                                       └───────┼───────┘
//!                                 ┌─────────────┴─────────────┐
//!                                 │     ExpirySweeper         │
//!                                 │  (Background Tokio Task)  │
//!                                 └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use wafstate::storage::{MemoryEngine, PersistentEngine};
//!
//! let engine = MemoryEngine::new();
//! engine.sum("IP", "10.0.0.1", "hits", 1).unwrap();
//! engine.sum("IP", "10.0.0.1", "hits", 1).unwrap();
//! assert_eq!(engine.get("IP", "10.0.0.1", "hits").unwrap(), "2");
//! ```

pub mod engine;
pub mod expiry;
pub mod memory;

// Re-export commonly used types
pub use engine::{EngineProvider, NoopEngine, PersistentEngine, StorageError, StorageResult};
pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use memory::{MemoryEngine, MemoryStats, MemoryStore, Metadata};
