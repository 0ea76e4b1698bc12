//! # wafstate - Persistent Collection State for a Web Application Firewall
//!
//! wafstate keeps the variables that WAF rules read and write across
//! requests: per-session counters, per-IP reputation, global flags. It also
//! keeps per-request variables and caches strictly inside their own
//! transaction, even when transactions are recycled through a pool.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                 Waf                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────────────────┐  │
//! │  │  setvar     │───>│ Transaction │───>│ CollectionHandle            │  │
//! │  │  (Action)   │    │ (pooled)    │    │  Map (TX) | Persistent      │  │
//! │  └─────────────┘    └──────┬──────┘    └──────────────┬──────────────┘  │
//! │                            │                          │                 │
//! │                            ▼                          ▼                 │
//! │                   ┌─────────────────┐  ┌──────────────────────────────┐ │
//! │                   │ TransactionPool │  │  dyn PersistentEngine        │ │
//! │                   │ reset on reuse  │  │  ┌────────┐ ┌────────┐       │ │
//! │                   └─────────────────┘  │  │Shard 0 │ │...N    │       │ │
//! │                                        │  │RwLock  │ │shards  │       │ │
//! │                                        │  └────────┘ └────────┘       │ │
//! │                                        └──────────────────────────────┘ │
//! │                                                       ▲                 │
//! │                                        ┌──────────────┴───────────────┐ │
//! │                                        │ ExpirySweeper (tokio task)   │ │
//! │                                        └──────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use wafstate::actions::{self, RuleInfo};
//! use wafstate::collection::CollectionName;
//! use wafstate::storage::{ExpiryConfig, MemoryEngine};
//! use wafstate::waf::{Waf, WafConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = MemoryEngine::provider(ExpiryConfig::default());
//!     let config = WafConfig::new().with_engine_provider(provider);
//!     let waf = Waf::new(config)?;
//!
//!     let counter = actions::get("setvar", "SESSION.hits=+1")?;
//!
//!     let mut tx = waf.new_transaction();
//!     tx.init_collection(CollectionName::Session, "c0ffee")?;
//!     counter.evaluate(&RuleInfo::new(1000), &mut tx);
//!     tx.close();
//!
//!     waf.close_persistent_engine()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: the engine contract, the in-memory engine and its expiry task
//! - [`collection`]: collection names and the transient/persistent variants
//! - [`actions`]: macros and the `setvar` action
//! - [`waf`]: configuration, the WAF owner, transactions and their pool
//!
//! ## Design Highlights
//!
//! ### Optional Persistence
//!
//! A configuration carries an optional engine *provider*. Without one, every
//! persistent write is a silent no-op through a null engine, so rules behave
//! the same whether or not state is kept.
//!
//! ### Lazy + Active Expiry
//!
//! Collection instances with a TTL are expired in two ways:
//! 1. **Lazy**: reads skip expired instances and writes replace them
//! 2. **Active**: a background task periodically removes them

pub mod actions;
pub mod collection;
pub mod storage;
pub mod waf;

// Re-export commonly used types for convenience
pub use actions::{Action, ActionError, RuleInfo, RuleMetadata, SetVar};
pub use collection::{CollectionHandle, CollectionName, MapCollection, PersistentCollection};
pub use storage::{
    EngineProvider, ExpiryConfig, MemoryEngine, PersistentEngine, StorageError, StorageResult,
};
pub use waf::{Transaction, Waf, WafConfig, WafError};

/// Version of wafstate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
