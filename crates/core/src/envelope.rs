//! [`EventEnvelope`] — the canonical shape of everything published on the
//! event bus (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BotId, ExecutionId, StrategyId, WorkflowId};

/// The canonical workflow event types (§3). This list is exhaustive — the
/// runtime never publishes a workflow-lifecycle event outside this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventType {
    /// A new execution began.
    ExecutionStarted,
    /// A node was dispatched.
    NodeStarted,
    /// A node finished successfully.
    NodeCompleted,
    /// A node's handler returned an error.
    NodeFailed,
    /// The execution reached `completed`.
    ExecutionCompleted,
    /// The execution reached `failed`.
    ExecutionFailed,
    /// The execution reached `halted`.
    ExecutionHalted,
    /// The emergency controller changed state.
    EmergencyStateChanged,
}

impl WorkflowEventType {
    /// The wire string used for `EventEnvelope::event_type` and the
    /// canonical event-bus channel suffix.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutionStarted => "execution_started",
            Self::NodeStarted => "node_started",
            Self::NodeCompleted => "node_completed",
            Self::NodeFailed => "node_failed",
            Self::ExecutionCompleted => "execution_completed",
            Self::ExecutionFailed => "execution_failed",
            Self::ExecutionHalted => "execution_halted",
            Self::EmergencyStateChanged => "emergency_state_changed",
        }
    }
}

impl std::fmt::Display for WorkflowEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An envelope published on the event bus.
///
/// Every workflow event carries `execution_id`/`workflow_id` and optionally
/// `bot_id`/`strategy_id` so the WebSocket fan-out can filter on them
/// without knowing the payload's internal shape (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The canonical event type.
    #[serde(rename = "type")]
    pub event_type: WorkflowEventType,
    /// The topic this was published to, e.g. `"workflow:arb_btc:events"`.
    pub channel: String,
    /// UTC timestamp at publication time.
    pub timestamp: DateTime<Utc>,
    /// The execution this event pertains to.
    pub execution_id: ExecutionId,
    /// The workflow this event pertains to.
    pub workflow_id: WorkflowId,
    /// Optional bot identifier, carried through for WebSocket filtering.
    pub bot_id: Option<BotId>,
    /// Optional strategy identifier, carried through for WebSocket filtering.
    pub strategy_id: Option<StrategyId>,
    /// Event-specific payload.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// The canonical channel name a workflow's lifecycle events are
    /// published under: `workflow:{workflow_id}:events`.
    #[must_use]
    pub fn channel_for(workflow_id: &WorkflowId) -> String {
        format!("workflow:{workflow_id}:events")
    }

    /// Build an envelope for the given workflow/execution pair.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_type: WorkflowEventType,
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        bot_id: Option<BotId>,
        strategy_id: Option<StrategyId>,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        let channel = Self::channel_for(&workflow_id);
        Self {
            event_type,
            channel,
            timestamp,
            execution_id,
            workflow_id,
            bot_id,
            strategy_id,
            payload,
        }
    }

    /// Whether this event's payload references the given workflow id — used
    /// by the WebSocket replay buffer and live fan-out filters (§4.10).
    #[must_use]
    pub fn matches_workflow(&self, workflow_id: &WorkflowId) -> bool {
        &self.workflow_id == workflow_id
    }

    /// Whether this event's payload references the given bot id.
    #[must_use]
    pub fn matches_bot(&self, bot_id: &BotId) -> bool {
        self.bot_id.as_ref() == Some(bot_id)
    }

    /// Whether this event's payload references the given strategy id.
    #[must_use]
    pub fn matches_strategy(&self, strategy_id: &StrategyId) -> bool {
        self.strategy_id.as_ref() == Some(strategy_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn channel_naming() {
        let workflow_id = WorkflowId::new("arb_btc");
        assert_eq!(
            EventEnvelope::channel_for(&workflow_id),
            "workflow:arb_btc:events"
        );
    }

    #[test]
    fn event_type_wire_strings_are_exhaustive() {
        let all = [
            WorkflowEventType::ExecutionStarted,
            WorkflowEventType::NodeStarted,
            WorkflowEventType::NodeCompleted,
            WorkflowEventType::NodeFailed,
            WorkflowEventType::ExecutionCompleted,
            WorkflowEventType::ExecutionFailed,
            WorkflowEventType::ExecutionHalted,
            WorkflowEventType::EmergencyStateChanged,
        ];
        let strings: Vec<&str> = all.iter().map(WorkflowEventType::as_str).collect();
        assert_eq!(
            strings,
            vec![
                "execution_started",
                "node_started",
                "node_completed",
                "node_failed",
                "execution_completed",
                "execution_failed",
                "execution_halted",
                "emergency_state_changed",
            ]
        );
    }

    #[test]
    fn matches_filters() {
        let workflow_id = WorkflowId::new("arb_btc");
        let bot_id = BotId::new("bot_1");
        let envelope = EventEnvelope::new(
            WorkflowEventType::ExecutionStarted,
            ExecutionId::new(&workflow_id),
            workflow_id.clone(),
            Some(bot_id.clone()),
            None,
            now(),
            serde_json::json!({}),
        );
        assert!(envelope.matches_workflow(&workflow_id));
        assert!(envelope.matches_bot(&bot_id));
        assert!(!envelope.matches_strategy(&StrategyId::new("s1")));
    }
}
