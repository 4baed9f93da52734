//! The four-state safety machine (§3, §4.6).

use serde::{Deserialize, Serialize};

/// The emergency controller's global safety state.
///
/// Trading is permitted iff the state is `Normal` or `Alert`; operating at
/// all is permitted iff the state is not `Shutdown`. `Shutdown` is terminal:
/// no transition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyState {
    /// Ordinary operation; trading and operating both permitted.
    Normal,
    /// A risk signal has been raised; trading and operating still permitted.
    Alert,
    /// Trading forbidden; the process may still read/operate (observe,
    /// report) but must not place orders.
    Halt,
    /// Nothing is permitted. Terminal — no transition leaves this state.
    Shutdown,
}

impl EmergencyState {
    /// `CanOperate()` (§4.6): anything but `Shutdown`.
    #[must_use]
    pub fn can_operate(self) -> bool {
        self != Self::Shutdown
    }

    /// `CanTrade()` (§4.6): `Normal` or `Alert` only.
    #[must_use]
    pub fn can_trade(self) -> bool {
        matches!(self, Self::Normal | Self::Alert)
    }
}

impl std::fmt::Display for EmergencyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Alert => "alert",
            Self::Halt => "halt",
            Self::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}

/// Whether the transition `from -> to` is allowed by the table in §4.6.
///
/// `Shutdown` has no outbound transitions. `Halt -> Alert` is explicitly
/// forbidden (a halted workflow must return all the way to `Normal` via
/// `Resume` before it can be merely `Alert`ed again). Self-transitions are
/// not modeled as transitions at all — callers that want to re-assert the
/// current state should just check the predicate instead.
#[must_use]
pub fn can_transition(from: EmergencyState, to: EmergencyState) -> bool {
    use EmergencyState::{Alert, Halt, Normal, Shutdown};
    matches!(
        (from, to),
        (Normal, Alert)
            | (Normal, Halt)
            | (Normal, Shutdown)
            | (Alert, Normal)
            | (Alert, Halt)
            | (Alert, Shutdown)
            | (Halt, Normal)
            | (Halt, Shutdown)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(EmergencyState::Normal, EmergencyState::Alert, true)]
    #[case(EmergencyState::Normal, EmergencyState::Halt, true)]
    #[case(EmergencyState::Normal, EmergencyState::Shutdown, true)]
    #[case(EmergencyState::Alert, EmergencyState::Normal, true)]
    #[case(EmergencyState::Alert, EmergencyState::Halt, true)]
    #[case(EmergencyState::Halt, EmergencyState::Normal, true)]
    #[case(EmergencyState::Halt, EmergencyState::Shutdown, true)]
    #[case(EmergencyState::Halt, EmergencyState::Alert, false)]
    #[case(EmergencyState::Shutdown, EmergencyState::Normal, false)]
    #[case(EmergencyState::Shutdown, EmergencyState::Alert, false)]
    #[case(EmergencyState::Shutdown, EmergencyState::Halt, false)]
    #[case(EmergencyState::Normal, EmergencyState::Normal, false)]
    fn transition_table_matches_spec(
        #[case] from: EmergencyState,
        #[case] to: EmergencyState,
        #[case] expected: bool,
    ) {
        assert_eq!(can_transition(from, to), expected);
    }

    #[test]
    fn predicates() {
        assert!(EmergencyState::Normal.can_operate());
        assert!(EmergencyState::Normal.can_trade());
        assert!(EmergencyState::Alert.can_operate());
        assert!(EmergencyState::Alert.can_trade());
        assert!(EmergencyState::Halt.can_operate());
        assert!(!EmergencyState::Halt.can_trade());
        assert!(!EmergencyState::Shutdown.can_operate());
        assert!(!EmergencyState::Shutdown.can_trade());
    }
}
