//! The append-only `EmergencyEventLog` (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::EmergencyState;

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyTransition {
    /// The state before the transition.
    pub from: EmergencyState,
    /// The state after the transition.
    pub to: EmergencyState,
    /// The caller-supplied reason.
    pub reason: String,
    /// When the transition was recorded.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary structured context, e.g. which risk limit triggered an
    /// auto-halt.
    pub metadata: serde_json::Value,
}

/// An append-only, in-memory log of every transition this process has ever
/// recorded. Never truncated — the spec places no bound on it, unlike the
/// WebSocket replay buffer (§4.10).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EmergencyEventLog {
    entries: Vec<EmergencyTransition>,
}

impl EmergencyEventLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transition.
    pub fn push(&mut self, transition: EmergencyTransition) {
        self.entries.push(transition);
    }

    /// Every recorded transition, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[EmergencyTransition] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_only_preserves_order() {
        let mut log = EmergencyEventLog::new();
        let now = Utc::now();
        log.push(EmergencyTransition {
            from: EmergencyState::Normal,
            to: EmergencyState::Alert,
            reason: "risk signal".into(),
            timestamp: now,
            metadata: serde_json::json!({}),
        });
        log.push(EmergencyTransition {
            from: EmergencyState::Alert,
            to: EmergencyState::Normal,
            reason: "resolved".into(),
            timestamp: now,
            metadata: serde_json::json!({}),
        });
        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.entries()[0].to, EmergencyState::Alert);
        assert_eq!(log.entries()[1].to, EmergencyState::Normal);
    }
}
