//! # Stratum Log
//!
//! Structured logging (C2): a JSON or console sink, built on `tracing` and
//! `tracing-subscriber`, the same stack `nebula-log` uses.
//!
//! Correlation ids do not ride a hand-rolled ambient-context singleton —
//! they ride `tracing`'s own span stack. [`correlated_span`] returns a span
//! carrying `correlation_id = %execution_id`; entering (or `.instrument()`ing
//! an async block with) that span propagates the field through every nested
//! call and across every `.await` point for the lifetime of the execution,
//! which is exactly the "ambient correlation context... across suspension
//! points" contract in §4.2. Concurrent executions never see each other's
//! correlation id because each has its own span, and `tracing`'s
//! thread-/task-local current-span pointer is restored on every re-entry.

mod format;

pub use format::Format;

// Re-export so call sites read like the spec's `Info/Warn/Error/Debug`
// contract without importing `tracing` directly.
pub use tracing::{debug, error, info, instrument, warn};
pub use tracing::Span;

use tracing_subscriber::EnvFilter;

/// Errors initializing the logging subsystem.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// A global subscriber was already installed (e.g. by a test harness).
    #[error("a tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Install the global `tracing` subscriber for the given format and level
/// filter (e.g. `"info"`, `"debug,stratum_runtime=trace"`).
///
/// Safe to call more than once per process in tests: subsequent calls are
/// reported as [`LogError::AlreadyInitialized`] rather than panicking, since
/// `tracing`'s global dispatcher can only be set once.
pub fn init(format: Format, level: &str) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        Format::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        Format::Console => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(true)
            .try_init(),
    };

    result.map_err(|_| LogError::AlreadyInitialized)
}

/// Build (but do not enter) the correlation span for one execution.
///
/// Callers `.in_scope(...)` it for synchronous sections or
/// `.instrument(fut)` an async block with it; every log record and every
/// event emitted underneath carries `correlation_id = execution_id` (§8
/// property 3).
#[must_use]
pub fn correlated_span(execution_id: &str) -> Span {
    tracing::info_span!("execution", correlation_id = %execution_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Instrument;

    #[test]
    fn correlated_span_carries_execution_id() {
        let span = correlated_span("exec_arb_btc_deadbeef");
        assert_eq!(span.metadata().unwrap().name(), "execution");
    }

    #[tokio::test]
    async fn span_survives_await_points() {
        let span = correlated_span("exec_abc");
        async {
            tokio::task::yield_now().await;
            assert!(tracing::Span::current().metadata().is_some());
        }
        .instrument(span)
        .await;
    }
}
