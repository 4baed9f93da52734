//! `WithRetry` (§4.5).

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ResilienceError;

/// An error that can classify itself as worth retrying.
///
/// `with_retry` takes a bare `is_retryable` predicate so a caller is never
/// forced to implement this for types it does not own (e.g. a provider
/// crate's bespoke error enum); `Retryable` exists for the common case of
/// an in-house error type that wants a default classification callers can
/// reuse instead of writing the match themselves.
pub trait Retryable {
    /// Whether retrying this error is worth attempting.
    fn is_retryable(&self) -> bool;
}

/// Backoff and attempt-budget configuration for [`with_retry`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Floor of the exponential backoff, before jitter.
    pub min_wait: Duration,
    /// Ceiling of the exponential backoff, before jitter.
    pub max_wait: Duration,
    /// Multiplier applied to the wait after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// The backoff duration before attempt number `attempt` (1-indexed,
    /// counting the attempt about to be made — so the wait *before* retry
    /// number 2 uses `attempt = 1`), with full jitter applied.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let unjittered = self.min_wait.mul_f64(exp).min(self.max_wait);
        unjittered.mul_f64(fastrand::f64())
    }
}

/// Retry `op` (a factory producing a fresh future per attempt — a retry
/// attempt is a new call, side effects are not rolled back) up to
/// `policy.max_attempts` times, using `is_retryable` to decide whether a
/// given error is transient. Non-retryable errors surface immediately.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, ResilienceError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts || !is_retryable(&err) {
                    return Err(ResilienceError::Operation(err));
                }
                let wait = policy.backoff_for(attempt);
                tracing::warn!(attempt, wait_ms = wait.as_millis() as u64, "retrying after transient failure");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
