//! Configuration load/validation errors (§4.1, §7).
//!
//! These surface at startup; the launcher (out of scope, §1) maps them to
//! process exit code `1`.

use thiserror::Error;

/// Errors raised while loading or validating [`crate::Settings`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value required by the selected configuration is missing, e.g.
    /// `redis_url` when a `redis` backend is selected.
    #[error("missing required configuration value: {0}")]
    MissingRequired(&'static str),

    /// A numeric value is outside its valid range, e.g. a threshold ≤ 0 or
    /// `retry_multiplier < 1.0`.
    #[error("configuration value {field} out of range: {reason}")]
    OutOfRange {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// An environment variable could not be parsed into its expected type.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// The raw string value that failed to parse.
        value: String,
    },
}
