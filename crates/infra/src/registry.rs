//! The named circuit-breaker factory (§4.5, §4.7).

use std::sync::Arc;

use dashmap::DashMap;
use stratum_resilience::{CircuitBreaker, CircuitBreakerConfig, Snapshot};

/// Creates and remembers one [`CircuitBreaker`] per name (one per provider,
/// or one per workflow for the per-workflow `api:{workflow_id}` breaker
/// C9 registers — §4.9). Looking up an existing name returns the same
/// shared instance; this is what makes `Initialize()` idempotent (§8
/// property 10): calling it twice for the same name never creates a
/// second breaker.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Build a registry whose breakers all share `config` unless created
    /// with [`Self::get_or_create_with`].
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Get the breaker named `name`, creating it with the registry's
    /// default configuration if it does not exist yet.
    #[must_use]
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, self.config)
    }

    /// As [`Self::get_or_create`], with an explicit configuration used only
    /// if the breaker does not already exist.
    #[must_use]
    pub fn get_or_create_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| CircuitBreaker::new(name, config))
            .clone()
    }

    /// An existing breaker, without creating one.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    /// A snapshot of every registered breaker, for `/health`/`/metrics`
    /// introspection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Snapshot> {
        self.breakers.iter().map(|entry| entry.value().snapshot()).collect()
    }
}
