//! Event bus errors (§4.4, §7).

use thiserror::Error;

/// Errors raised by a [`crate::EventBus`] implementation.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The backend (e.g. Redis pub/sub) could not be reached.
    #[error("event bus backend unreachable: {0}")]
    Backend(String),

    /// A `glob` pattern passed to `subscribe_pattern` was malformed.
    #[error("invalid subscription pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}
