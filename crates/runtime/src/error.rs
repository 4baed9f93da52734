//! Errors [`crate::WorkflowRuntime::execute`] can surface to its caller
//! (§4.9, §7).

use thiserror::Error;

use stratum_emergency::EmergencyError;
use stratum_workflow::GraphError;

/// Errors that propagate out of [`crate::WorkflowRuntime::execute`].
///
/// Per §7, node-handler failures never reach this type — they are
/// captured, translated to `node_failed`, and folded into the returned
/// [`stratum_core::ExecutionRecord`]'s `failed`/`halted` status instead.
/// Only the workflow-structural and safety failures named here actually
/// propagate as an `Err`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The emergency controller forbade this execution, either before
    /// dispatch began or partway through (§4.9 "mid-run halt").
    #[error(transparent)]
    Halted(#[from] EmergencyError),

    /// The workflow's graph could not be scheduled at all (a cycle).
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The workflow definition itself is structurally invalid (duplicate
    /// node id, or an edge referencing an unknown node).
    #[error(transparent)]
    Definition(#[from] stratum_core::WorkflowError),
}
