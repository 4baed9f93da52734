//! The `state:` key layout (§3) as typed constructors, so callers never
//! hand-format a state-store key.

use crate::ids::{ExecutionId, WorkflowId};

/// Key for an execution's current status: `"running" | "completed" | ...`.
#[must_use]
pub fn execution_status_key(workflow_id: &WorkflowId, execution_id: &ExecutionId) -> String {
    format!("workflow:{workflow_id}:execution:{execution_id}:status")
}

/// Key for an execution's persisted result (the `ExecutionRecord`, minus
/// `status`, which is tracked separately for fast polling).
#[must_use]
pub fn execution_result_key(workflow_id: &WorkflowId, execution_id: &ExecutionId) -> String {
    format!("workflow:{workflow_id}:execution:{execution_id}:result")
}

/// Key pointing at the most recently started execution id for a workflow.
#[must_use]
pub fn latest_execution_key(workflow_id: &WorkflowId) -> String {
    format!("workflow:{workflow_id}:latest_execution")
}

/// Key for the emergency controller's persisted state.
pub const EMERGENCY_STATE_KEY: &str = "emergency:state";

/// Key for the emergency controller's persisted risk-limit table.
pub const EMERGENCY_RISK_LIMITS_KEY: &str = "emergency:risk_limits";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_spec() {
        let workflow_id = WorkflowId::new("arb_btc");
        let execution_id = ExecutionId::from("exec_arb_btc_deadbeef".to_string());

        assert_eq!(
            execution_status_key(&workflow_id, &execution_id),
            "workflow:arb_btc:execution:exec_arb_btc_deadbeef:status"
        );
        assert_eq!(
            execution_result_key(&workflow_id, &execution_id),
            "workflow:arb_btc:execution:exec_arb_btc_deadbeef:result"
        );
        assert_eq!(
            latest_execution_key(&workflow_id),
            "workflow:arb_btc:latest_execution"
        );
    }
}
