//! [`WorkflowRuntime`] — the enhanced workflow runtime (C9, §4.9): one
//! instance per `(workflow_definition, workflow_id, bot_id?, strategy_id?)`
//! tuple, applying per-node resilience and the emergency controller around
//! [`stratum_workflow::GraphExecutor`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use stratum_core::keys::{execution_result_key, execution_status_key, latest_execution_key};
use stratum_core::{
    BotId, EventEnvelope, ExecutionFailure, ExecutionId, ExecutionRecord, ExecutionStatus,
    NodeCategory, StrategyId, WorkflowDefinition, WorkflowEventType, WorkflowId,
};
use stratum_emergency::EmergencyError;
use stratum_infra::Infra;
use stratum_resilience::RetryPolicy;
use stratum_workflow::{GraphExecutor, GraphOutcome, HandlerRegistry, NodeObserver, RunEnvironment};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::RuntimeError;
use crate::observer::RuntimeObserver;
use crate::resilient;

/// Applies per-node resilience wrapping, emergency gating, correlation, and
/// state/event persistence around one workflow's graph execution. Built
/// once per workflow and reused across repeated `execute()` calls — §8's
/// S3 depends on re-running the same runtime after an auto-halt without any
/// reconstruction.
pub struct WorkflowRuntime {
    infra: Arc<Infra>,
    definition: WorkflowDefinition,
    workflow_id: WorkflowId,
    bot_id: Option<BotId>,
    strategy_id: Option<StrategyId>,
    raw_handlers: HandlerRegistry,
    breaker_name: String,
    cancellation: Mutex<CancellationToken>,
}

impl WorkflowRuntime {
    /// Build a runtime for one workflow. Call [`Self::initialize`] before
    /// the first [`Self::execute`].
    #[must_use]
    pub fn new(
        infra: Arc<Infra>,
        definition: WorkflowDefinition,
        workflow_id: WorkflowId,
        bot_id: Option<BotId>,
        strategy_id: Option<StrategyId>,
        raw_handlers: HandlerRegistry,
    ) -> Self {
        let breaker_name = format!("api:{workflow_id}");
        Self {
            infra,
            definition,
            workflow_id,
            bot_id,
            strategy_id,
            raw_handlers,
            breaker_name,
            cancellation: Mutex::new(CancellationToken::new()),
        }
    }

    /// `Initialize()` (§4.9): validate the definition's structural shape and
    /// register this workflow's circuit breaker. Idempotent — re-running it
    /// validates the same definition again and
    /// [`stratum_infra::CircuitBreakerRegistry::get_or_create`] returns the
    /// already-registered breaker rather than a fresh one (§8 property 10).
    pub fn initialize(&self) -> Result<(), RuntimeError> {
        self.definition.validate_shape()?;
        self.infra.breakers.get_or_create(&self.breaker_name);
        Ok(())
    }

    /// `Cancel()` (§4.9, §5): cooperative. The in-flight `execute()` call
    /// stops dispatching new rounds; nodes already running continue to
    /// completion or their own timeout.
    pub fn cancel(&self) {
        self.cancellation.lock().cancel();
    }

    /// `Execute() → ExecutionRecord` (§4.9).
    pub async fn execute(&self) -> Result<ExecutionRecord, RuntimeError> {
        let execution_id = ExecutionId::new(&self.workflow_id);
        let span = stratum_log::correlated_span(execution_id.as_str());
        self.execute_inner(execution_id).instrument(span).await
    }

    async fn execute_inner(&self, execution_id: ExecutionId) -> Result<ExecutionRecord, RuntimeError> {
        let started_at = Utc::now();

        // Step 2: pre-dispatch emergency assertions. A violation here never
        // dispatches a single node, matches `execution_started` is never
        // published, and S2/§8-property-4 ("no node_started under halt").
        if let Err(err) = self.infra.emergency.assert_can_operate() {
            return self.reject_before_dispatch(execution_id, started_at, err).await;
        }
        if self.definition.has_category(NodeCategory::Actions) {
            if let Err(err) = self.infra.emergency.assert_can_trade() {
                return self.reject_before_dispatch(execution_id, started_at, err).await;
            }
        }

        let record = Arc::new(Mutex::new(ExecutionRecord {
            execution_id: execution_id.clone(),
            workflow_id: self.workflow_id.clone(),
            bot_id: self.bot_id.clone(),
            strategy_id: self.strategy_id.clone(),
            started_at,
            ended_at: None,
            status: ExecutionStatus::Running,
            per_node_output: HashMap::new(),
            per_node_duration_ms: HashMap::new(),
            error: None,
        }));

        self.persist_status(&execution_id, ExecutionStatus::Running).await;
        self.set_latest_execution(&execution_id).await;
        self.publish(
            WorkflowEventType::ExecutionStarted,
            execution_id.clone(),
            serde_json::json!({ "node_count": self.definition.nodes.len() }),
        )
        .await;

        let cancellation = self.cancellation.lock().clone();
        let gate_tripped = Arc::new(AtomicBool::new(false));
        let gate = self.build_trading_gate(gate_tripped.clone());

        let specialized = resilient::specialize(&self.definition);
        let registry = self.build_registry();
        let executor = GraphExecutor::new(registry);

        let (observer, drain_handle) = RuntimeObserver::spawn(
            self.infra.events.clone(),
            record.clone(),
            execution_id.clone(),
            self.workflow_id.clone(),
            self.bot_id.clone(),
            self.strategy_id.clone(),
        );
        let observer: Arc<dyn NodeObserver> = Arc::new(observer);

        let env = RunEnvironment {
            execution_id: execution_id.to_string(),
            cancellation,
            events: self.infra.events.clone(),
            gate: Some(gate),
        };

        let run_result = executor.run(&specialized, observer, env).await;
        // The executor's only owner of `observer` was dropped when `run`
        // returned, closing the channel; wait for every queued node event
        // to actually publish before this run's terminal event does, so
        // subscribers never see `execution_completed` arrive ahead of a
        // `node_completed` (§5 "execution_started precedes every node_*,
        // which precedes the terminal execution_* event").
        let _ = drain_handle.await;

        match run_result {
            Err(graph_err) => {
                let finished = self
                    .finalize(
                        &execution_id,
                        &record,
                        ExecutionStatus::Failed,
                        Some(ExecutionFailure {
                            kind: "workflow_cycle".to_string(),
                            message: graph_err.to_string(),
                        }),
                    )
                    .await;
                let _ = finished;
                Err(RuntimeError::Graph(graph_err))
            }
            Ok(outcome) => self.finalize_from_outcome(&execution_id, &record, &outcome, &gate_tripped).await,
        }
    }

    async fn finalize_from_outcome(
        &self,
        execution_id: &ExecutionId,
        record: &Arc<Mutex<ExecutionRecord>>,
        outcome: &GraphOutcome,
        gate_tripped: &AtomicBool,
    ) -> Result<ExecutionRecord, RuntimeError> {
        if gate_tripped.load(Ordering::SeqCst) {
            let finished = self
                .finalize(
                    execution_id,
                    record,
                    ExecutionStatus::Halted,
                    Some(ExecutionFailure {
                        kind: "emergency_halted".to_string(),
                        message: "emergency controller forbade trading mid-run".to_string(),
                    }),
                )
                .await;
            let _ = finished;
            return Err(RuntimeError::Halted(EmergencyError::Halted {
                state: self.infra.emergency.state(),
                reason: "not trading".to_string(),
            }));
        }

        if outcome.succeeded(&self.definition) {
            Ok(self.finalize(execution_id, record, ExecutionStatus::Completed, None).await)
        } else {
            let finished = self
                .finalize(
                    execution_id,
                    record,
                    ExecutionStatus::Failed,
                    Some(ExecutionFailure {
                        kind: "node_failed".to_string(),
                        message: describe_failure(outcome),
                    }),
                )
                .await;
            Ok(finished)
        }
    }

    /// The gate `RunEnvironment` consults before every node dispatch. Only
    /// `actions` nodes are subject to the mid-run `CanTrade` re-check (§4.9
    /// "mid-run halt"); every other category is always admitted.
    fn build_trading_gate(
        &self,
        gate_tripped: Arc<AtomicBool>,
    ) -> Arc<dyn Fn(&str) -> bool + Send + Sync> {
        let definition = self.definition.clone();
        let emergency = self.infra.emergency.clone();
        Arc::new(move |node_id: &str| {
            let Some(node) = definition.node(node_id) else {
                return true;
            };
            if node.category != NodeCategory::Actions {
                return true;
            }
            if emergency.can_trade() {
                true
            } else {
                gate_tripped.store(true, Ordering::SeqCst);
                false
            }
        })
    }

    fn build_registry(&self) -> HandlerRegistry {
        let settings = &self.infra.settings;
        let retry_policy = RetryPolicy {
            max_attempts: settings.retry_max_attempts,
            min_wait: Duration::from_secs_f64(settings.retry_min_wait_seconds),
            max_wait: Duration::from_secs_f64(settings.retry_max_wait_seconds),
            multiplier: settings.retry_multiplier,
        };
        let default_timeout = Duration::from_secs(settings.default_node_timeout_seconds);
        let breaker = self.infra.breakers.get_or_create(&self.breaker_name);
        resilient::build_resilient_registry(
            &self.definition,
            &self.raw_handlers,
            breaker,
            self.infra.emergency.clone(),
            retry_policy,
            default_timeout,
        )
    }

    async fn reject_before_dispatch(
        &self,
        execution_id: ExecutionId,
        started_at: DateTime<Utc>,
        err: EmergencyError,
    ) -> Result<ExecutionRecord, RuntimeError> {
        let ended_at = Utc::now();
        let record = ExecutionRecord {
            execution_id: execution_id.clone(),
            workflow_id: self.workflow_id.clone(),
            bot_id: self.bot_id.clone(),
            strategy_id: self.strategy_id.clone(),
            started_at,
            ended_at: Some(ended_at),
            status: ExecutionStatus::Halted,
            per_node_output: HashMap::new(),
            per_node_duration_ms: HashMap::new(),
            error: Some(ExecutionFailure {
                kind: "emergency_halted".to_string(),
                message: err.to_string(),
            }),
        };

        self.persist_status(&execution_id, ExecutionStatus::Halted).await;
        self.persist_result(&execution_id, &record).await;
        self.publish(
            WorkflowEventType::ExecutionHalted,
            execution_id,
            serde_json::json!({ "status": record.status, "error": record.error }),
        )
        .await;

        Err(RuntimeError::Halted(err))
    }

    async fn finalize(
        &self,
        execution_id: &ExecutionId,
        record: &Arc<Mutex<ExecutionRecord>>,
        status: ExecutionStatus,
        error: Option<ExecutionFailure>,
    ) -> ExecutionRecord {
        let ended_at = Utc::now();
        let finished = {
            let mut guard = record.lock();
            let _ = guard.finish(status, ended_at, error);
            guard.clone()
        };

        self.persist_status(execution_id, status).await;
        self.persist_result(execution_id, &finished).await;

        let event_type = match status {
            ExecutionStatus::Completed => WorkflowEventType::ExecutionCompleted,
            ExecutionStatus::Failed => WorkflowEventType::ExecutionFailed,
            ExecutionStatus::Halted => WorkflowEventType::ExecutionHalted,
            ExecutionStatus::Running => {
                unreachable!("finalize is only ever called with a terminal status")
            }
        };
        self.publish(
            event_type,
            execution_id.clone(),
            serde_json::json!({ "status": finished.status, "error": finished.error }),
        )
        .await;

        finished
    }

    async fn publish(&self, event_type: WorkflowEventType, execution_id: ExecutionId, payload: Value) {
        let channel = EventEnvelope::channel_for(&self.workflow_id);
        let envelope = EventEnvelope::new(
            event_type,
            execution_id,
            self.workflow_id.clone(),
            self.bot_id.clone(),
            self.strategy_id.clone(),
            Utc::now(),
            payload,
        );
        if let Err(err) = self.infra.events.publish(&channel, envelope).await {
            tracing::warn!(error = %err, "failed to publish workflow event; continuing");
        }
    }

    async fn persist_status(&self, execution_id: &ExecutionId, status: ExecutionStatus) {
        let key = execution_status_key(&self.workflow_id, execution_id);
        if let Err(err) = self.infra.state.set(&key, serde_json::json!(status)).await {
            tracing::warn!(error = %err, "failed to persist execution status; continuing");
        }
    }

    async fn persist_result(&self, execution_id: &ExecutionId, record: &ExecutionRecord) {
        let key = execution_result_key(&self.workflow_id, execution_id);
        // `status` is tracked separately under `execution_status_key` for
        // fast polling; don't duplicate it in the result payload.
        let mut value = serde_json::json!(record);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("status");
        }
        if let Err(err) = self.infra.state.set(&key, value).await {
            tracing::warn!(error = %err, "failed to persist execution result; continuing");
        }
    }

    async fn set_latest_execution(&self, execution_id: &ExecutionId) {
        let key = latest_execution_key(&self.workflow_id);
        if let Err(err) = self.infra.state.set(&key, serde_json::json!(execution_id.as_str())).await {
            tracing::warn!(error = %err, "failed to persist latest execution pointer; continuing");
        }
    }
}

fn describe_failure(outcome: &GraphOutcome) -> String {
    let mut failed: Vec<&str> = outcome.failed.iter().map(String::as_str).collect();
    failed.sort_unstable();
    let mut not_executed: Vec<&str> = outcome.not_executed.iter().map(String::as_str).collect();
    not_executed.sort_unstable();
    format!("failed={failed:?} not_executed={not_executed:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use stratum_config::{Environment, Settings};
    use stratum_core::{Edge, Node};
    use stratum_workflow::{NodeContext, NodeHandler};

    fn node(id: &str, category: NodeCategory) -> Node {
        Node {
            id: id.to_string(),
            category,
            node_type: "echo".to_string(),
            name: id.to_string(),
            properties: StdHashMap::new(),
            timeout: None,
        }
    }

    fn echo_handler() -> Arc<dyn NodeHandler> {
        Arc::new(
            |inputs: StdHashMap<String, Value>, _props, _ctx: NodeContext| async move {
                let mut out = StdHashMap::new();
                out.insert("0".to_string(), inputs.get("0").cloned().unwrap_or(Value::Bool(true)));
                Ok(out)
            },
        )
    }

    async fn infra() -> Arc<Infra> {
        Arc::new(Infra::initialize(Settings::defaults(Environment::Development)).await.unwrap())
    }

    fn chain_definition() -> WorkflowDefinition {
        WorkflowDefinition::new(
            vec![
                node("provider_1", NodeCategory::Providers),
                node("condition_1", NodeCategory::Conditions),
                node("action_1", NodeCategory::Actions),
            ],
            vec![
                Edge { from_node_id: "provider_1".into(), from_output_index: 0, to_node_id: "condition_1".into(), to_input_index: 0 },
                Edge { from_node_id: "condition_1".into(), from_output_index: 0, to_node_id: "action_1".into(), to_input_index: 0 },
            ],
        )
    }

    fn registry_for(definition: &WorkflowDefinition) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        for node in &definition.nodes {
            registry.register(node.category, "echo", echo_handler());
        }
        registry
    }

    #[tokio::test]
    async fn happy_path_completes_and_persists_status() {
        let infra = infra().await;
        let definition = chain_definition();
        let handlers = registry_for(&definition);
        let workflow_id = WorkflowId::new("arb_btc");
        let runtime = WorkflowRuntime::new(infra.clone(), definition, workflow_id.clone(), None, None, handlers);
        runtime.initialize().unwrap();

        let record = runtime.execute().await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.per_node_output.len(), 3);

        let key = execution_status_key(&workflow_id, &record.execution_id);
        let persisted = infra.state.get(&key).await.unwrap().unwrap();
        assert_eq!(persisted, serde_json::json!("completed"));
    }

    #[tokio::test]
    async fn halt_before_run_rejects_without_dispatching_anything() {
        let infra = infra().await;
        infra.emergency.halt("test", serde_json::json!({})).await.unwrap();
        let definition = chain_definition();
        let handlers = registry_for(&definition);
        let runtime = WorkflowRuntime::new(infra.clone(), definition, WorkflowId::new("arb_btc"), None, None, handlers);
        runtime.initialize().unwrap();

        let err = runtime.execute().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Halted(_)));
    }

    #[tokio::test]
    async fn initialize_is_idempotent_about_the_breaker() {
        let infra = infra().await;
        let definition = chain_definition();
        let handlers = registry_for(&definition);
        let runtime = WorkflowRuntime::new(infra.clone(), definition, WorkflowId::new("arb_btc"), None, None, handlers);
        runtime.initialize().unwrap();
        runtime.initialize().unwrap();
        assert_eq!(infra.breakers.snapshot().len(), 1);
    }
}
