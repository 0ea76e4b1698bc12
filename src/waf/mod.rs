//! WAF Module
//!
//! The runtime side of the crate: configuration, the [`Waf`] that owns the
//! persistent engine, and pooled [`Transaction`]s.
//!
//! ## Ownership
//!
//! ```text
//! WafConfig ──provider()──> Waf ─┬─ Arc<dyn PersistentEngine>  (shared)
//!                                └─ Arc<TransactionPool>
//!                                        │ acquire / release
//!                                        ▼
//!                                   Transaction  (TX vars, transformation
//!                                                 cache, bound keys: owned)
//! ```

pub mod config;
pub mod engine;
pub mod pool;
pub mod transaction;

// Re-export commonly used types
pub use config::{WafConfig, DEFAULT_POOL_CAPACITY};
pub use engine::{Waf, WafError};
pub use pool::{PoolStats, TransactionPool, TransformationKey, TransformationValue};
pub use transaction::{Transaction, GLOBAL_INSTANCE_KEY};
