//! `CircuitBreaker` (§4.5).

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ResilienceError;

/// A circuit breaker's externally observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Calls pass through.
    Closed,
    /// Calls fail immediately without invoking the wrapped operation.
    Open,
    /// A bounded number of probe calls are allowed through.
    HalfOpen,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// Time an open breaker waits before allowing probes, once opened.
    pub recovery_timeout: Duration,
    /// Concurrent probes allowed while half-open; this many consecutive
    /// successes also close the breaker again.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

/// A point-in-time, serializable view of a breaker's state, for the
/// infrastructure assembly's observability surface (§4.5, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The breaker's name.
    pub name: String,
    /// Current state.
    pub state: State,
    /// Consecutive failures recorded in the current `closed` window.
    pub failures: u32,
    /// When the most recent failure was recorded, if any.
    pub last_failure_at: Option<DateTime<Utc>>,
}

struct Inner {
    state: State,
    failures: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    half_open_in_flight: u32,
    half_open_successes: u32,
}

/// A named, shared circuit breaker guarding a single external dependency
/// (one per provider, per §4.5).
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Outcome of a pre-call admission check.
enum Admission {
    Proceed,
    ProceedAsProbe,
    Reject,
}

impl CircuitBreaker {
    /// Create a named breaker, starting `closed`.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failures: 0,
                opened_at: None,
                last_failure_at: None,
                half_open_in_flight: 0,
                half_open_successes: 0,
            }),
        })
    }

    /// This breaker's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A point-in-time snapshot for observability.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
            last_failure_at: inner.last_failure_at,
        }
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => Admission::Proceed,
            State::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened_at| opened_at.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(false);
                if elapsed {
                    inner.state = State::HalfOpen;
                    inner.half_open_in_flight = 1;
                    inner.half_open_successes = 0;
                    tracing::info!(breaker = %self.name, "circuit transitioning to half_open");
                    Admission::ProceedAsProbe
                } else {
                    Admission::Reject
                }
            }
            State::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_calls {
                    inner.half_open_in_flight += 1;
                    Admission::ProceedAsProbe
                } else {
                    Admission::Reject
                }
            }
        }
    }

    fn record_success(&self, was_probe: bool) {
        let mut inner = self.inner.lock();
        if was_probe {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
        match inner.state {
            State::Closed => {
                inner.failures = 0;
            }
            State::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_max_calls {
                    inner.state = State::Closed;
                    inner.failures = 0;
                    inner.opened_at = None;
                    tracing::info!(breaker = %self.name, "circuit closed after successful probes");
                }
            }
            State::Open => {}
        }
    }

    fn record_failure(&self, was_probe: bool) {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(Utc::now());
        if was_probe {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
        match inner.state {
            State::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(breaker = %self.name, failures = inner.failures, "circuit opened");
                }
            }
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_in_flight = 0;
                tracing::warn!(breaker = %self.name, "probe failed, circuit reopened");
            }
            State::Open => {}
        }
    }

    /// Guard `op` with this breaker: rejected immediately while `open`,
    /// otherwise invoked and used to update the breaker's state.
    pub async fn call<T, E, F>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        let was_probe = match self.admit() {
            Admission::Proceed => false,
            Admission::ProceedAsProbe => true,
            Admission::Reject => {
                return Err(ResilienceError::CircuitOpen {
                    name: self.name.clone(),
                })
            }
        };

        match op.await {
            Ok(value) => {
                self.record_success(was_probe);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(was_probe);
                Err(ResilienceError::Operation(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, recovery: Duration, half_open: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery,
            half_open_max_calls: half_open,
        }
    }

    #[tokio::test]
    async fn closed_breaker_passes_calls_through() {
        let breaker = CircuitBreaker::new("provider_a", CircuitBreakerConfig::default());
        let result: Result<u32, ResilienceError<&str>> = breaker.call(async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(breaker.snapshot().state, State::Closed);
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("provider_a", config(2, Duration::from_secs(60), 1));
        for _ in 0..2 {
            let _: Result<u32, ResilienceError<&str>> = breaker.call(async { Err("boom") }).await;
        }
        assert_eq!(breaker.snapshot().state, State::Open);

        let result: Result<u32, ResilienceError<&str>> = breaker.call(async { Ok(1) }).await;
        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn half_opens_after_recovery_timeout_and_closes_on_success() {
        let breaker = CircuitBreaker::new(
            "provider_a",
            config(1, Duration::from_millis(10), 1),
        );
        let _: Result<u32, ResilienceError<&str>> = breaker.call(async { Err("boom") }).await;
        assert_eq!(breaker.snapshot().state, State::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let result: Result<u32, ResilienceError<&str>> = breaker.call(async { Ok(1) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.snapshot().state, State::Closed);
    }

    #[tokio::test]
    async fn failed_probe_reopens_the_circuit() {
        let breaker = CircuitBreaker::new(
            "provider_a",
            config(1, Duration::from_millis(10), 1),
        );
        let _: Result<u32, ResilienceError<&str>> = breaker.call(async { Err("boom") }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let _: Result<u32, ResilienceError<&str>> = breaker.call(async { Err("still broken") }).await;
        assert_eq!(breaker.snapshot().state, State::Open);
    }
}
