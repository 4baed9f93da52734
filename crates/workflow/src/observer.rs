//! [`NodeObserver`] — the callback the executor reports node lifecycle
//! through (§4.8: "event emission is not owned by the graph executor").

use serde_json::Value;

/// Reports per-node lifecycle during a [`crate::executor::GraphExecutor`]
/// run. `stratum-runtime` implements this to translate node lifecycle into
/// `node_started`/`node_completed`/`node_failed` events and state-store
/// writes; the executor itself knows nothing about events or persistence.
pub trait NodeObserver: Send + Sync {
    /// A node has been dispatched.
    fn on_node_started(&self, node_id: &str) {
        let _ = node_id;
    }

    /// A node finished successfully.
    fn on_node_completed(&self, node_id: &str, output: &Value, duration_ms: u64) {
        let _ = (node_id, output, duration_ms);
    }

    /// A node failed, either via its handler or because no handler was
    /// registered for it.
    fn on_node_failed(&self, node_id: &str, error: &str, duration_ms: u64) {
        let _ = (node_id, error, duration_ms);
    }

    /// A node was skipped because an upstream dependency failed or was
    /// itself skipped (§4.8 cascade).
    fn on_node_not_executed(&self, node_id: &str) {
        let _ = node_id;
    }
}

/// An observer that does nothing, for tests that only care about the
/// returned [`crate::executor::GraphOutcome`].
pub struct NoopObserver;

impl NodeObserver for NoopObserver {}
