//! [`RuntimeObserver`] — translates [`stratum_workflow::NodeObserver`]
//! callbacks into `node_*` events and writes into the live
//! [`ExecutionRecord`] (§4.8 "event emission is not owned by the graph
//! executor", §4.9).
//!
//! `NodeObserver`'s methods are synchronous (the executor calls them from a
//! plain loop, never `.await`s them), so publishing — an async operation —
//! cannot happen inline. Each callback instead enqueues onto an unbounded
//! channel; a single background task drains it in order and awaits
//! [`EventBus::publish`] for each one. This keeps `node_started` ->
//! `node_completed` -> `node_failed` ordering intact for subscribers, the
//! same ordering guarantee [`crate::runtime::WorkflowRuntime`] relies on
//! when it awaits the drain handle before publishing the terminal event.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use stratum_core::{
    BotId, EventEnvelope, ExecutionId, ExecutionRecord, StrategyId, WorkflowEventType, WorkflowId,
};
use stratum_events::EventBus;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Reports node lifecycle as `node_*` events, and folds completed nodes'
/// output/duration into the shared [`ExecutionRecord`].
pub struct RuntimeObserver {
    tx: mpsc::UnboundedSender<(WorkflowEventType, Value)>,
    record: Arc<Mutex<ExecutionRecord>>,
}

impl RuntimeObserver {
    /// Build an observer and its background publisher. The returned
    /// [`JoinHandle`] resolves once every enqueued event has been
    /// published — awaited by `Self`'s owner after the observer itself has
    /// been dropped (closing the channel) so publication order is
    /// guaranteed before the caller moves on to the run's terminal event.
    pub fn spawn(
        events: Arc<dyn EventBus>,
        record: Arc<Mutex<ExecutionRecord>>,
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        bot_id: Option<BotId>,
        strategy_id: Option<StrategyId>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(WorkflowEventType, Value)>();
        let channel = EventEnvelope::channel_for(&workflow_id);

        let handle = tokio::spawn(async move {
            while let Some((event_type, payload)) = rx.recv().await {
                let envelope = EventEnvelope::new(
                    event_type,
                    execution_id.clone(),
                    workflow_id.clone(),
                    bot_id.clone(),
                    strategy_id.clone(),
                    chrono::Utc::now(),
                    payload,
                );
                if let Err(err) = events.publish(&channel, envelope).await {
                    tracing::warn!(error = %err, "failed to publish node event; continuing");
                }
            }
        });

        (Self { tx, record }, handle)
    }
}

impl stratum_workflow::NodeObserver for RuntimeObserver {
    fn on_node_started(&self, node_id: &str) {
        let _ = self.tx.send((
            WorkflowEventType::NodeStarted,
            serde_json::json!({ "node_id": node_id }),
        ));
    }

    fn on_node_completed(&self, node_id: &str, output: &Value, duration_ms: u64) {
        self.record.lock().record_node(node_id, output.clone(), duration_ms);
        let _ = self.tx.send((
            WorkflowEventType::NodeCompleted,
            serde_json::json!({ "node_id": node_id, "output": output, "duration_ms": duration_ms }),
        ));
    }

    fn on_node_failed(&self, node_id: &str, error: &str, duration_ms: u64) {
        let _ = self.tx.send((
            WorkflowEventType::NodeFailed,
            serde_json::json!({ "node_id": node_id, "error": error, "duration_ms": duration_ms }),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stratum_core::{ExecutionRecord, ExecutionStatus, WorkflowId};
    use stratum_events::MemoryEventBus;
    use stratum_workflow::NodeObserver;

    #[tokio::test]
    async fn node_completed_records_output_and_duration() {
        let workflow_id = WorkflowId::new("arb_btc");
        let record = Arc::new(Mutex::new(ExecutionRecord::start(workflow_id.clone(), None, None, Utc::now())));
        let (observer, handle) = RuntimeObserver::spawn(
            Arc::new(MemoryEventBus::new()),
            record.clone(),
            ExecutionId::new(&workflow_id),
            workflow_id,
            None,
            None,
        );

        observer.on_node_started("provider_1");
        observer.on_node_completed("provider_1", &serde_json::json!({"price": 50_000}), 12);
        drop(observer);
        handle.await.unwrap();

        let record = record.lock();
        assert_eq!(record.per_node_output.get("provider_1"), Some(&serde_json::json!({"price": 50_000})));
        assert_eq!(record.per_node_duration_ms.get("provider_1"), Some(&12));
        assert_eq!(record.status, ExecutionStatus::Running);
    }
}
