//! [`ExecutionRecord`] — the persisted and caller-visible record of one
//! workflow execution (§3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{BotId, ExecutionId, StrategyId, WorkflowId};

/// The terminal (or in-flight) status of a workflow execution.
///
/// Unlike a generic execution-state machine with pause/resume, the spec's
/// data model (§3) names exactly four states: a run is `running` until it
/// reaches one of three terminal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Actively dispatching nodes.
    Running,
    /// All terminal nodes completed without failure.
    Completed,
    /// At least one terminal node failed or was not executed.
    Failed,
    /// Stopped early because the emergency controller forbade the work.
    Halted,
}

impl ExecutionStatus {
    /// Returns `true` once the execution has reached one of the three
    /// terminal outcomes.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Halted => "halted",
        };
        write!(f, "{s}")
    }
}

/// A structured failure reason attached to a failed or halted execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// A short, matchable failure kind (e.g. `"node_failed"`, `"emergency_halted"`).
    pub kind: String,
    /// A human-readable message.
    pub message: String,
}

/// Errors constructing or mutating an [`ExecutionRecord`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Attempted to finish an execution that was already terminal.
    #[error("execution {0} is already in a terminal state")]
    AlreadyTerminal(ExecutionId),
}

/// The persisted record of one workflow execution (§3).
///
/// Execution ids are formed deterministically as
/// `exec_{workflow_id}_{8-hex-chars}` and double as the correlation id for
/// all work done on behalf of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// The execution id / correlation id.
    pub execution_id: ExecutionId,
    /// The workflow this is an execution of.
    pub workflow_id: WorkflowId,
    /// Optional bot identifier.
    pub bot_id: Option<BotId>,
    /// Optional strategy identifier.
    pub strategy_id: Option<StrategyId>,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal status, if it has.
    pub ended_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: ExecutionStatus,
    /// Per-node handler output, keyed by node id.
    pub per_node_output: HashMap<String, serde_json::Value>,
    /// Per-node wall-clock duration, in milliseconds.
    pub per_node_duration_ms: HashMap<String, u64>,
    /// Failure details, present only when `status` is `failed` or `halted`.
    pub error: Option<ExecutionFailure>,
}

impl ExecutionRecord {
    /// Start a new execution record in the `running` state.
    #[must_use]
    pub fn start(
        workflow_id: WorkflowId,
        bot_id: Option<BotId>,
        strategy_id: Option<StrategyId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let execution_id = ExecutionId::new(&workflow_id);
        Self {
            execution_id,
            workflow_id,
            bot_id,
            strategy_id,
            started_at,
            ended_at: None,
            status: ExecutionStatus::Running,
            per_node_output: HashMap::new(),
            per_node_duration_ms: HashMap::new(),
            error: None,
        }
    }

    /// Record a node's output and duration.
    pub fn record_node(&mut self, node_id: &str, output: serde_json::Value, duration_ms: u64) {
        self.per_node_output.insert(node_id.to_string(), output);
        self.per_node_duration_ms
            .insert(node_id.to_string(), duration_ms);
    }

    /// Transition to a terminal status, stamping `ended_at`.
    pub fn finish(
        &mut self,
        status: ExecutionStatus,
        ended_at: DateTime<Utc>,
        error: Option<ExecutionFailure>,
    ) -> Result<(), ExecutionError> {
        if self.status.is_terminal() {
            return Err(ExecutionError::AlreadyTerminal(self.execution_id.clone()));
        }
        self.status = status;
        self.ended_at = Some(ended_at);
        self.error = error;
        Ok(())
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
    fn starts_running_with_derived_execution_id() {
        let record = ExecutionRecord::start(WorkflowId::new("arb_btc"), None, None, now());
        assert_eq!(record.status, ExecutionStatus::Running);
        assert!(record.execution_id.as_str().starts_with("exec_arb_btc_"));
        assert!(record.ended_at.is_none());
    }

    #[test]
    fn finish_sets_terminal_fields() {
        let mut record = ExecutionRecord::start(WorkflowId::new("arb_btc"), None, None, now());
        record
            .finish(ExecutionStatus::Completed, now(), None)
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn finish_twice_errors() {
        let mut record = ExecutionRecord::start(WorkflowId::new("arb_btc"), None, None, now());
        record
            .finish(ExecutionStatus::Completed, now(), None)
            .unwrap();
        let err = record.finish(ExecutionStatus::Failed, now(), None);
        assert_eq!(err, Err(ExecutionError::AlreadyTerminal(record.execution_id.clone())));
    }

    #[test]
    fn record_node_output_accumulates() {
        let mut record = ExecutionRecord::start(WorkflowId::new("arb_btc"), None, None, now());
        record.record_node("provider_1", serde_json::json!({"price": 50000}), 12);
        assert_eq!(
            record.per_node_output.get("provider_1"),
            Some(&serde_json::json!({"price": 50000}))
        );
        assert_eq!(record.per_node_duration_ms.get("provider_1"), Some(&12));
    }
}
