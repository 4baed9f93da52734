//! `WithTimeout` (§4.5).

use std::future::Future;
use std::time::Duration;

use crate::error::ResilienceError;

/// Run `op`, failing with [`ResilienceError::Timeout`] if it has not
/// produced a result after `duration`.
///
/// Cancellation of the in-flight future is cooperative: dropping the
/// `tokio::time::timeout` future (which this does internally on timeout)
/// stops polling it, but does not otherwise interrupt work already spawned
/// by `op`.
pub async fn with_timeout<T, E, F>(duration: Duration, op: F) -> Result<T, ResilienceError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(duration, op).await {
        Ok(result) => result.map_err(ResilienceError::Operation),
        Err(_) => Err(ResilienceError::Timeout {
            elapsed_ms: duration.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_before_deadline() {
        let result: Result<u32, ResilienceError<String>> =
            with_timeout(Duration::from_millis(50), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn times_out_when_op_is_slow() {
        let result: Result<u32, ResilienceError<String>> =
            with_timeout(Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(42)
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::Timeout { .. })));
    }

    #[tokio::test]
    async fn propagates_operation_error() {
        let result: Result<u32, ResilienceError<&'static str>> =
            with_timeout(Duration::from_millis(50), async { Err("boom") }).await;
        assert!(matches!(result, Err(ResilienceError::Operation("boom"))));
    }
}
