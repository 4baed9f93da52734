//! [`GraphExecutor`] — round-based concurrent dispatch over a
//! [`Graph`] (§4.8).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use stratum_core::{NodeCategory, WorkflowDefinition};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{GraphError, NodeError};
use crate::graph::Graph;
use crate::node_handler::NodeContext;
use crate::observer::NodeObserver;
use crate::registry::HandlerRegistry;
use stratum_events::EventBus;

/// Everything the executor needs to dispatch one run that it does not
/// already get from the [`WorkflowDefinition`] and [`HandlerRegistry`]:
/// cancellation and the event bus handlers may publish to (§6).
#[derive(Clone)]
pub struct RunEnvironment {
    /// Identifies the run, for [`NodeContext::execution_id`].
    pub execution_id: String,
    /// Cancelled to stop dispatching further rounds (`Runtime::Cancel`).
    pub cancellation: CancellationToken,
    /// Shared event bus, passed through to handlers.
    pub events: Arc<dyn EventBus>,
    /// Consulted immediately before a node would otherwise be dispatched;
    /// `false` skips it straight to `not_executed` without ever calling its
    /// handler. `stratum-runtime` uses this for the mid-run emergency
    /// re-check before `actions` nodes — the executor itself has no notion
    /// of what the gate means.
    pub gate: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
}

/// The terminal state of one graph run.
#[derive(Debug, Default)]
pub struct GraphOutcome {
    /// Each completed node's output, keyed by output port index.
    pub outputs: HashMap<String, HashMap<String, Value>>,
    /// Wall-clock duration of each dispatched node, in milliseconds.
    pub durations_ms: HashMap<String, u64>,
    /// Nodes whose handler returned an error, or had no handler registered.
    pub failed: HashSet<String>,
    /// Nodes skipped because an upstream dependency failed (§4.8 cascade).
    pub not_executed: HashSet<String>,
}

impl GraphOutcome {
    /// Whether the run as a whole succeeded: no terminal node is `failed`
    /// or `not_executed` (§4.8).
    #[must_use]
    pub fn succeeded(&self, definition: &WorkflowDefinition) -> bool {
        definition
            .terminal_node_ids()
            .into_iter()
            .all(|id| !self.failed.contains(id) && !self.not_executed.contains(id))
    }
}

/// Dispatches a workflow's DAG to completion: each round runs every node
/// whose predecessors have all completed, concurrently; a node whose
/// predecessor failed or was itself skipped cascades to `not_executed`
/// without ever being dispatched.
///
/// Domain-agnostic by design — it reports lifecycle through
/// [`NodeObserver`] and never touches `stratum-events` or `stratum-state`
/// directly; `stratum-runtime` owns that translation (§4.8).
pub struct GraphExecutor {
    registry: HandlerRegistry,
}

impl GraphExecutor {
    /// Build an executor against a fixed handler registry.
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Run `definition` to completion, reporting lifecycle to `observer`.
    ///
    /// Returns [`GraphError`] only for a structural problem (a cycle) that
    /// prevents dispatch from starting at all; per-node failures are
    /// reported in the returned [`GraphOutcome`], not as an `Err`.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        observer: Arc<dyn NodeObserver>,
        env: RunEnvironment,
    ) -> Result<GraphOutcome, GraphError> {
        let graph = Graph::from_definition(definition)?;
        let mut outcome = GraphOutcome::default();
        let mut done: HashSet<String> = HashSet::new();

        loop {
            if env.cancellation.is_cancelled() {
                break;
            }

            let pending: Vec<&str> = graph
                .node_ids()
                .iter()
                .map(String::as_str)
                .filter(|id| !done.contains(*id))
                .collect();
            if pending.is_empty() {
                break;
            }

            let mut newly_skipped: Vec<&str> = Vec::new();
            let mut ready: Vec<&str> = Vec::new();
            for node_id in pending {
                let predecessors = graph.predecessors(node_id);
                let blocked = predecessors.iter().any(|incoming| {
                    outcome.failed.contains(&incoming.from_node_id)
                        || outcome.not_executed.contains(&incoming.from_node_id)
                });
                if blocked {
                    newly_skipped.push(node_id);
                    continue;
                }
                let all_ready = predecessors
                    .iter()
                    .all(|incoming| outcome.outputs.contains_key(&incoming.from_node_id));
                if !all_ready {
                    continue;
                }
                let gated = env.gate.as_ref().is_some_and(|gate| !gate(node_id));
                if gated {
                    newly_skipped.push(node_id);
                } else {
                    ready.push(node_id);
                }
            }

            for node_id in &newly_skipped {
                outcome.not_executed.insert((*node_id).to_string());
                done.insert((*node_id).to_string());
                observer.on_node_not_executed(node_id);
            }

            if ready.is_empty() {
                // Every remaining node is blocked on a predecessor that is
                // itself still pending; an earlier round will resolve it
                // before the graph's acyclicity lets this loop forever.
                continue;
            }

            // Stable dispatch order even though execution is concurrent,
            // so `node_started` is observed in a deterministic sequence.
            ready.sort_unstable();

            let mut join_set: JoinSet<(String, Result<NodeRunResult, NodeError>)> = JoinSet::new();
            for node_id in &ready {
                let node = definition
                    .node(node_id)
                    .expect("ready node ids come from the graph built off this definition");
                let handler = self.registry.lookup(node.category, &node.node_type);
                let inputs = resolve_inputs(&graph, node_id, &outcome.outputs);
                let properties = node.properties.clone();
                let ctx = NodeContext {
                    execution_id: env.execution_id.clone(),
                    node_id: (*node_id).to_string(),
                    cancellation: env.cancellation.clone(),
                    events: env.events.clone(),
                };
                observer.on_node_started(node_id);

                let node_id_owned = (*node_id).to_string();
                let category = node.category;
                let node_type = node.node_type.clone();
                join_set.spawn(async move {
                    let started = Instant::now();
                    let result = match handler {
                        None => Err(NodeError::NoHandler {
                            category: category.to_string(),
                            node_type,
                        }),
                        Some(handler) => handler
                            .handle(inputs, properties, ctx)
                            .await
                            .map(|output| NodeRunResult {
                                output,
                                duration_ms: started.elapsed().as_millis() as u64,
                            })
                            .map_err(|e| NodeError::Handler(e.to_string())),
                    };
                    (node_id_owned, result)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let (node_id, result) = joined.expect("node task panicked");
                match result {
                    Ok(run_result) => {
                        observer.on_node_completed(&node_id, &serde_json::json!(run_result.output), run_result.duration_ms);
                        outcome.durations_ms.insert(node_id.clone(), run_result.duration_ms);
                        outcome.outputs.insert(node_id.clone(), run_result.output);
                        done.insert(node_id);
                    }
                    Err(err) => {
                        observer.on_node_failed(&node_id, &err.to_string(), 0);
                        outcome.failed.insert(node_id.clone());
                        done.insert(node_id);
                    }
                }
            }
        }

        Ok(outcome)
    }
}

struct NodeRunResult {
    output: HashMap<String, Value>,
    duration_ms: u64,
}

fn resolve_inputs(
    graph: &Graph,
    node_id: &str,
    outputs: &HashMap<String, HashMap<String, Value>>,
) -> HashMap<String, Value> {
    let mut inputs = HashMap::new();
    for incoming in graph.predecessors(node_id) {
        let value = outputs
            .get(&incoming.from_node_id)
            .and_then(|out| out.get(&incoming.from_output_index.to_string()))
            .cloned()
            .unwrap_or(Value::Null);
        inputs.insert(incoming.to_input_index.to_string(), value);
    }
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stratum_core::{Edge, Node};
    use stratum_events::MemoryEventBus;

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

    fn env() -> RunEnvironment {
        RunEnvironment {
            execution_id: "exec-1".to_string(),
            cancellation: CancellationToken::new(),
            events: Arc::new(MemoryEventBus::new()),
            gate: None,
        }
    }

    fn echo_handler() -> Arc<dyn crate::node_handler::NodeHandler> {
        Arc::new(
            |inputs: StdHashMap<String, Value>, _props, _ctx: NodeContext| async move {
                let mut out = StdHashMap::new();
                out.insert("0".to_string(), inputs.get("0").cloned().unwrap_or(Value::Bool(true)));
                Ok(out)
            },
        )
    }

    #[tokio::test]
    async fn runs_a_chain_to_completion() {
        let def = WorkflowDefinition::new(
            vec![node("a", NodeCategory::Providers), node("b", NodeCategory::Actions)],
            vec![Edge { from_node_id: "a".into(), from_output_index: 0, to_node_id: "b".into(), to_input_index: 0 }],
        );
        let mut registry = HandlerRegistry::new();
        registry.register(NodeCategory::Providers, "echo", echo_handler());
        registry.register(NodeCategory::Actions, "echo", echo_handler());
        let executor = GraphExecutor::new(registry);

        let outcome = executor.run(&def, Arc::new(NoopObserver), env()).await.unwrap();
        assert!(outcome.succeeded(&def));
        assert!(outcome.outputs.contains_key("a"));
        assert!(outcome.outputs.contains_key("b"));
    }

    #[tokio::test]
    async fn missing_handler_cascades_not_executed_downstream() {
        let def = WorkflowDefinition::new(
            vec![node("a", NodeCategory::Providers), node("b", NodeCategory::Actions)],
            vec![Edge { from_node_id: "a".into(), from_output_index: 0, to_node_id: "b".into(), to_input_index: 0 }],
        );
        let registry = HandlerRegistry::new();
        let executor = GraphExecutor::new(registry);

        let outcome = executor.run(&def, Arc::new(NoopObserver), env()).await.unwrap();
        assert!(!outcome.succeeded(&def));
        assert!(outcome.failed.contains("a"));
        assert!(outcome.not_executed.contains("b"));
    }

    #[tokio::test]
    async fn cycle_is_rejected_before_any_dispatch() {
        let def = WorkflowDefinition::new(
            vec![node("a", NodeCategory::Providers), node("b", NodeCategory::Actions)],
            vec![
                Edge { from_node_id: "a".into(), from_output_index: 0, to_node_id: "b".into(), to_input_index: 0 },
                Edge { from_node_id: "b".into(), from_output_index: 0, to_node_id: "a".into(), to_input_index: 0 },
            ],
        );
        let executor = GraphExecutor::new(HandlerRegistry::new());
        let result = executor.run(&def, Arc::new(NoopObserver), env()).await;
        assert!(matches!(result, Err(GraphError::Cycle { .. })));
    }

    #[tokio::test]
    async fn independent_branches_both_dispatch() {
        let def = WorkflowDefinition::new(
            vec![
                node("root", NodeCategory::Providers),
                node("left", NodeCategory::Conditions),
                node("right", NodeCategory::Conditions),
            ],
            vec![
                Edge { from_node_id: "root".into(), from_output_index: 0, to_node_id: "left".into(), to_input_index: 0 },
                Edge { from_node_id: "root".into(), from_output_index: 0, to_node_id: "right".into(), to_input_index: 0 },
            ],
        );
        let mut registry = HandlerRegistry::new();
        registry.register(NodeCategory::Providers, "echo", echo_handler());
        registry.register(NodeCategory::Conditions, "echo", echo_handler());
        let executor = GraphExecutor::new(registry);

        let outcome = executor.run(&def, Arc::new(NoopObserver), env()).await.unwrap();
        assert!(outcome.outputs.contains_key("left"));
        assert!(outcome.outputs.contains_key("right"));
    }

    #[tokio::test]
    async fn observer_sees_started_before_completed() {
        struct Tracking {
            started: AtomicUsize,
            completed: AtomicUsize,
        }
        impl NodeObserver for Tracking {
            fn on_node_started(&self, _node_id: &str) {
                self.started.fetch_add(1, Ordering::SeqCst);
            }
            fn on_node_completed(&self, _node_id: &str, _output: &Value, _duration_ms: u64) {
                self.completed.fetch_add(1, Ordering::SeqCst);
            }
        }
        let def = WorkflowDefinition::new(vec![node("a", NodeCategory::Providers)], vec![]);
        let mut registry = HandlerRegistry::new();
        registry.register(NodeCategory::Providers, "echo", echo_handler());
        let executor = GraphExecutor::new(registry);
        let tracking = Arc::new(Tracking { started: AtomicUsize::new(0), completed: AtomicUsize::new(0) });

        executor.run(&def, tracking.clone(), env()).await.unwrap();
        assert_eq!(tracking.started.load(Ordering::SeqCst), 1);
        assert_eq!(tracking.completed.load(Ordering::SeqCst), 1);
    }
}
