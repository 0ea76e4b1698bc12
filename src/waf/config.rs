//! WAF Configuration
//!
//! [`WafConfig`] is an immutable value. Every builder method returns a new
//! configuration and leaves the receiver untouched, so a base configuration
//! can be shared and specialised without surprises.
//!
//! Persistence is an explicit, optional capability: the configuration carries
//! an [`EngineProvider`], never an engine. Each [`Waf`](crate::waf::Waf) built
//! from it asks the provider for its own engine.

use crate::storage::EngineProvider;
use std::fmt;

/// Default number of idle transactions kept for reuse.
pub const DEFAULT_POOL_CAPACITY: usize = 128;

/// Configuration for a [`Waf`](crate::waf::Waf).
#[derive(Clone)]
pub struct WafConfig {
    engine_provider: Option<EngineProvider>,
    pool_capacity: usize,
}

impl fmt::Debug for WafConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WafConfig")
            .field("engine_provider", &self.engine_provider.is_some())
            .field("pool_capacity", &self.pool_capacity)
            .finish()
    }
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            engine_provider: None,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl WafConfig {
    /// Creates a configuration with persistence disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new configuration that builds engines with `provider`.
    pub fn with_engine_provider(&self, provider: EngineProvider) -> Self {
        Self {
            engine_provider: Some(provider),
            ..self.clone()
        }
    }

    /// Returns a new configuration with persistence disabled.
    pub fn without_engine_provider(&self) -> Self {
        Self {
            engine_provider: None,
            ..self.clone()
        }
    }

    /// Returns a new configuration keeping at most `capacity` idle transactions.
    pub fn with_pool_capacity(&self, capacity: usize) -> Self {
        Self {
            pool_capacity: capacity,
            ..self.clone()
        }
    }

    /// Returns the engine provider, if persistence is enabled.
    pub fn engine_provider(&self) -> Option<&EngineProvider> {
        self.engine_provider.as_ref()
    }

    /// Returns the idle transaction pool capacity.
    pub fn pool_capacity(&self) -> usize {
        self.pool_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ExpiryConfig, MemoryEngine, PersistentEngine};

    #[test]
    fn test_default_has_no_provider() {
        let config = WafConfig::new();

        assert!(config.engine_provider().is_none());
        assert_eq!(config.pool_capacity(), DEFAULT_POOL_CAPACITY);
    }

    #[test]
    fn test_builders_return_new_values() {
        let base = WafConfig::new();
        let persistent = base.with_engine_provider(MemoryEngine::provider(ExpiryConfig::default()));
        let small = persistent.with_pool_capacity(4);

        assert!(base.engine_provider().is_none());
        assert!(persistent.engine_provider().is_some());
        assert_eq!(persistent.pool_capacity(), DEFAULT_POOL_CAPACITY);
        assert!(small.engine_provider().is_some());
        assert_eq!(small.pool_capacity(), 4);

        let disabled = small.without_engine_provider();
        assert!(disabled.engine_provider().is_none());
        assert!(small.engine_provider().is_some());
    }

    #[test]
    fn test_cloned_configs_build_separate_engines() {
        let provider = MemoryEngine::provider(ExpiryConfig::default());
        let config = WafConfig::new().with_engine_provider(provider);
        let copy = config.clone();

        let a = (config.engine_provider().unwrap())().unwrap();
        let b = (copy.engine_provider().unwrap())().unwrap();

        a.set("GLOBAL", "global", "n", "1").unwrap();
        assert_eq!(b.get("GLOBAL", "global", "n").unwrap(), "");
    }
}
