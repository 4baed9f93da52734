//! # Stratum Resilience
//!
//! Three composable wrappers around an awaitable operation (C5):
//! [`with_timeout`], [`with_retry`], and [`CircuitBreaker`].

mod circuit_breaker;
mod error;
mod retry;
mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, Snapshot, State};
pub use error::ResilienceError;
pub use retry::{with_retry, Retryable, RetryPolicy};
pub use timeout::with_timeout;
