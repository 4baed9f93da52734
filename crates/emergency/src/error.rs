//! Emergency controller errors (§4.6, §7).

use thiserror::Error;

use crate::state::EmergencyState;

/// Errors raised by [`crate::EmergencyController`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmergencyError {
    /// A trading or operating predicate failed; propagates from
    /// `Execute()` to the caller after the terminal `execution_halted`
    /// event is written (§7).
    #[error("operation forbidden: emergency state is {state} ({reason})")]
    Halted {
        /// The state that forbade the operation.
        state: EmergencyState,
        /// Why the predicate failed, e.g. `"not operating"` or `"not trading"`.
        reason: String,
    },

    /// An attempted state transition is not allowed from the current state
    /// (§4.6 transition table; `SHUTDOWN` is terminal).
    #[error("cannot transition from {from} to {to}")]
    InvalidTransition {
        /// The state the controller was in.
        from: EmergencyState,
        /// The state the caller asked to move to.
        to: EmergencyState,
    },

    /// `CheckLimit` was called for a name never passed to `RegisterLimit`.
    #[error("risk limit {0:?} is not registered")]
    UnknownLimit(String),
}
