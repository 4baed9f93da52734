//! Errors the fan-out server's startup path can surface (§6 "Exit codes").

use thiserror::Error;

/// Errors raised bringing up or running the `stratum-realtime` server.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Infra(#[from] stratum_infra::InfraError),

    #[error(transparent)]
    Config(#[from] stratum_config::ConfigError),

    #[error(transparent)]
    Events(#[from] stratum_events::EventBusError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
