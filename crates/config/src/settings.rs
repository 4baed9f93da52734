//! The [`Settings`] record and its environment-variable loader (§4.1, §6).

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The selected deployment environment. Chosen by a single string on the
/// process entry point (§6); every default in this module is keyed off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Looser defaults, console logs, smaller retry budgets.
    Development,
    /// Stricter defaults, JSON logs, larger retry budgets.
    Production,
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidValue {
                field: "environment",
                value: other.to_string(),
            }),
        }
    }
}

/// A pluggable backend selector shared by the state store and event bus
/// (§4.1 `state_backend`/`events_backend`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local, in-memory implementation.
    Memory,
    /// Redis-backed implementation.
    Redis,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::InvalidValue {
                field: "backend",
                value: other.to_string(),
            }),
        }
    }
}

/// Typed settings for every Stratum component (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// The environment these settings were resolved for.
    pub environment: Environment,

    // --- backends ---
    /// State store backend.
    pub state_backend: BackendKind,
    /// Event bus backend.
    pub events_backend: BackendKind,
    /// Redis connection URL. Required when either backend above is `redis`.
    pub redis_url: Option<String>,

    // --- logging ---
    /// `console` or `json`.
    pub log_format: String,
    /// `tracing`-style filter directive, e.g. `"info"`.
    pub log_level: String,

    // --- resilience ---
    /// Maximum attempts for a `providers`-category node (§4.5).
    pub retry_max_attempts: u32,
    /// Minimum backoff, in seconds.
    pub retry_min_wait_seconds: f64,
    /// Maximum backoff, in seconds.
    pub retry_max_wait_seconds: f64,
    /// Exponential backoff multiplier; must be ≥ 1.0.
    pub retry_multiplier: f64,
    /// Consecutive failures before a circuit breaker opens.
    pub circuit_failure_threshold: u32,
    /// Time an open breaker waits before probing again, in seconds.
    pub circuit_recovery_timeout_seconds: u64,
    /// Concurrent probes allowed while half-open.
    pub circuit_half_open_max_calls: u32,
    /// Fallback per-node timeout when a node has none of its own, in seconds.
    pub default_node_timeout_seconds: u64,

    // --- emergency ---
    /// Daily loss floor — a negative number; breach is `current ≤ limit`.
    pub daily_loss_limit: f64,
    /// Maximum position size risk limit.
    pub max_position_size: f64,
    /// Maximum drawdown, as a percent.
    pub max_drawdown_percent: f64,
    /// Whether emergency state/risk limits persist to the state store.
    pub persist_state: bool,

    // --- websocket fan-out ---
    /// Bind host for the WebSocket/HTTP server.
    pub ws_host: String,
    /// Bind port for the WebSocket/HTTP server.
    pub ws_port: u16,
    /// Shared bearer token clients must present when `require_auth` is set.
    pub auth_token: Option<String>,
    /// Whether clients must authenticate before subscribing.
    pub require_auth: bool,
    /// Size of the replay buffer retained per process (§4.10).
    pub recent_events_capacity: usize,
    /// Allowed CORS origins; `["*"]` in development.
    pub cors_allowed_origins: Vec<String>,
}

impl Settings {
    /// Build the environment-appropriate defaults, before any environment
    /// variable overrides are applied.
    #[must_use]
    pub fn defaults(environment: Environment) -> Self {
        let (retry_max_attempts, circuit_failure_threshold, log_format, cors) =
            match environment {
                Environment::Development => (2, 5, "console", vec!["*".to_string()]),
                Environment::Production => (3, 10, "json", vec![]),
            };

        Self {
            environment,
            state_backend: BackendKind::Memory,
            events_backend: BackendKind::Memory,
            redis_url: None,
            log_format: log_format.to_string(),
            log_level: "info".to_string(),
            retry_max_attempts,
            retry_min_wait_seconds: 0.5,
            retry_max_wait_seconds: 10.0,
            retry_multiplier: 2.0,
            circuit_failure_threshold,
            circuit_recovery_timeout_seconds: 30,
            circuit_half_open_max_calls: 1,
            default_node_timeout_seconds: 30,
            daily_loss_limit: -1000.0,
            max_position_size: 100_000.0,
            max_drawdown_percent: 20.0,
            persist_state: false,
            ws_host: "127.0.0.1".to_string(),
            ws_port: 8787,
            auth_token: None,
            require_auth: false,
            recent_events_capacity: 100,
            cors_allowed_origins: cors,
        }
    }

    /// Load settings for `environment`, applying `STRATUM_*` environment
    /// variable overrides, then validate the result.
    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        let mut settings = Self::defaults(environment);

        if let Some(v) = env_str("STRATUM_STATE_BACKEND") {
            settings.state_backend = v.parse()?;
        }
        if let Some(v) = env_str("STRATUM_EVENTS_BACKEND") {
            settings.events_backend = v.parse()?;
        }
        if let Some(v) = env_str("STRATUM_REDIS_URL") {
            settings.redis_url = Some(v);
        }
        if let Some(v) = env_str("STRATUM_LOG_FORMAT") {
            settings.log_format = v;
        }
        if let Some(v) = env_str("STRATUM_LOG_LEVEL") {
            settings.log_level = v;
        }
        if let Some(v) = env_parse("STRATUM_RETRY_MAX_ATTEMPTS", "retry_max_attempts")? {
            settings.retry_max_attempts = v;
        }
        if let Some(v) = env_parse("STRATUM_RETRY_MIN_WAIT_SECONDS", "retry_min_wait_seconds")? {
            settings.retry_min_wait_seconds = v;
        }
        if let Some(v) = env_parse("STRATUM_RETRY_MAX_WAIT_SECONDS", "retry_max_wait_seconds")? {
            settings.retry_max_wait_seconds = v;
        }
        if let Some(v) = env_parse("STRATUM_RETRY_MULTIPLIER", "retry_multiplier")? {
            settings.retry_multiplier = v;
        }
        if let Some(v) = env_parse(
            "STRATUM_CIRCUIT_FAILURE_THRESHOLD",
            "circuit_failure_threshold",
        )? {
            settings.circuit_failure_threshold = v;
        }
        if let Some(v) = env_parse(
            "STRATUM_CIRCUIT_RECOVERY_TIMEOUT_SECONDS",
            "circuit_recovery_timeout_seconds",
        )? {
            settings.circuit_recovery_timeout_seconds = v;
        }
        if let Some(v) = env_parse(
            "STRATUM_CIRCUIT_HALF_OPEN_MAX_CALLS",
            "circuit_half_open_max_calls",
        )? {
            settings.circuit_half_open_max_calls = v;
        }
        if let Some(v) = env_parse(
            "STRATUM_DEFAULT_NODE_TIMEOUT_SECONDS",
            "default_node_timeout_seconds",
        )? {
            settings.default_node_timeout_seconds = v;
        }
        if let Some(v) = env_parse("STRATUM_DAILY_LOSS_LIMIT", "daily_loss_limit")? {
            settings.daily_loss_limit = v;
        }
        if let Some(v) = env_parse("STRATUM_MAX_POSITION_SIZE", "max_position_size")? {
            settings.max_position_size = v;
        }
        if let Some(v) = env_parse("STRATUM_MAX_DRAWDOWN_PERCENT", "max_drawdown_percent")? {
            settings.max_drawdown_percent = v;
        }
        if let Some(v) = env_parse("STRATUM_PERSIST_STATE", "persist_state")? {
            settings.persist_state = v;
        }
        if let Some(v) = env_str("STRATUM_WS_HOST") {
            settings.ws_host = v;
        }
        if let Some(v) = env_parse("STRATUM_WS_PORT", "ws_port")? {
            settings.ws_port = v;
        }
        if let Some(v) = env_str("STRATUM_AUTH_TOKEN") {
            settings.auth_token = Some(v);
        }
        if let Some(v) = env_parse("STRATUM_REQUIRE_AUTH", "require_auth")? {
            settings.require_auth = v;
        }
        if let Some(v) = env_parse(
            "STRATUM_RECENT_EVENTS_CAPACITY",
            "recent_events_capacity",
        )? {
            settings.recent_events_capacity = v;
        }
        if let Some(v) = env_str("STRATUM_CORS_ALLOWED_ORIGINS") {
            settings.cors_allowed_origins =
                v.split(',').map(|s| s.trim().to_string()).collect();
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validate range and required-value constraints (§4.1, §7).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state_backend == BackendKind::Redis && self.redis_url.is_none() {
            return Err(ConfigError::MissingRequired("redis_url"));
        }
        if self.events_backend == BackendKind::Redis && self.redis_url.is_none() {
            return Err(ConfigError::MissingRequired("redis_url"));
        }

        if self.retry_max_attempts == 0 {
            return Err(out_of_range("retry_max_attempts", "must be at least 1"));
        }
        if self.retry_multiplier < 1.0 {
            return Err(out_of_range("retry_multiplier", "must be >= 1.0"));
        }
        if self.circuit_failure_threshold == 0 {
            return Err(out_of_range(
                "circuit_failure_threshold",
                "must be positive",
            ));
        }
        if self.circuit_recovery_timeout_seconds == 0 {
            return Err(out_of_range(
                "circuit_recovery_timeout_seconds",
                "must be positive",
            ));
        }
        if self.circuit_half_open_max_calls == 0 {
            return Err(out_of_range(
                "circuit_half_open_max_calls",
                "must be positive",
            ));
        }
        if self.default_node_timeout_seconds == 0 {
            return Err(out_of_range(
                "default_node_timeout_seconds",
                "must be positive",
            ));
        }
        if self.daily_loss_limit >= 0.0 {
            return Err(out_of_range("daily_loss_limit", "must be negative"));
        }
        if self.max_position_size <= 0.0 {
            return Err(out_of_range("max_position_size", "must be positive"));
        }

        Ok(())
    }
}

fn out_of_range(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        reason: reason.to_string(),
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str, field: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
{
    match env_str(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { field, value: raw }),
        None => Ok(None),
    }
}
