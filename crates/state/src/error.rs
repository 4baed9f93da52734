//! State store errors (§4.3, §7).

use thiserror::Error;

/// Errors raised by a [`crate::StateStore`] implementation.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backend (e.g. Redis) could not be reached or returned an error.
    /// Per §4.3, a failed `set` is non-fatal to execution; callers log this
    /// and continue.
    #[error("state store backend unreachable: {0}")]
    Backend(String),

    /// A stored value could not be decoded as JSON.
    #[error("state store value for key {key:?} is not valid JSON: {source}")]
    Decode {
        /// The offending key.
        key: String,
        /// The decode failure.
        #[source]
        source: serde_json::Error,
    },
}
