//! Resilience wrapper errors (§4.5, §7).

use thiserror::Error;

/// Errors raised by the resilience wrappers, or by the wrapped operation.
///
/// `E` is the wrapped operation's own error type; `WithRetry` inspects it
/// via [`Retryable`](crate::retry::Retryable) to decide whether to retry.
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// `op` did not complete within the allotted duration.
    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout {
        /// How long the wrapper waited before giving up.
        elapsed_ms: u64,
    },

    /// The circuit is `OPEN`; `op` was not invoked.
    #[error("circuit {name:?} is open")]
    CircuitOpen {
        /// The breaker's name.
        name: String,
    },

    /// `op` itself failed (after exhausting retries, if any applied).
    #[error(transparent)]
    Operation(#[from] E),
}
