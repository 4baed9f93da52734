//! Infrastructure assembly errors (§4.7, §7).

use thiserror::Error;

/// Errors raised bringing up or tearing down the infrastructure assembly.
#[derive(Debug, Error)]
pub enum InfraError {
    /// `state_backend`/`events_backend` selected `redis` but this binary
    /// was not compiled with the `redis-backend` feature.
    #[error("{0} backend \"redis\" selected but the redis-backend feature is not compiled in")]
    RedisNotCompiled(&'static str),

    /// Connecting to the configured Redis URL failed.
    #[error("failed to connect {0} backend to redis: {1}")]
    BackendConnect(&'static str, String),

    /// Installing the global `tracing` subscriber failed for a reason
    /// other than "already initialized" (which [`crate::Infra::initialize`]
    /// tolerates, since tests commonly call it more than once per process).
    #[error("failed to initialize logging: {0}")]
    Log(#[from] stratum_log::LogError),
}
