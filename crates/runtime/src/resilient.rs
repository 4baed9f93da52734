//! Category-specific resilience wrapping (§4.9 step 5): before a node is
//! handed to the graph executor, its handler is wrapped according to its
//! category —
//!
//! - `providers`: `WithRetry(WithTimeout(Breaker.call(handler)))`
//! - `risk`: `WithTimeout(handler)`, plus reporting an exceeded limit to
//!   the emergency controller via `CheckLimit`
//! - `triggers, conditions, actions`: `WithTimeout(handler)` only — no
//!   retry, since these are not assumed idempotent
//!
//! A node's own `timeout` (falling back to `default_node_timeout_seconds`)
//! is resolved once per node, not once per `(category, type)`, because two
//! nodes of the same type may configure different timeouts. To keep
//! `stratum-workflow`'s `HandlerRegistry` as the simple `(category, type)`
//! map it already is, this module dispatches through a synthetic node type
//! unique to each node id (see [`dispatch_key`]) rather than teaching the
//! executor about per-node overrides.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use stratum_core::{NodeCategory, WorkflowDefinition};
use stratum_emergency::EmergencyController;
use stratum_resilience::{with_retry, with_timeout, CircuitBreaker, ResilienceError, Retryable, RetryPolicy};
use stratum_workflow::{HandlerRegistry, NodeContext, NodeFailure, NodeHandler};

type HandlerErr = Box<dyn std::error::Error + Send + Sync>;
/// The error `CircuitBreaker::call` produces, wrapping a handler's own error.
type BreakerErr = ResilienceError<HandlerErr>;
/// The error `with_timeout` produces wrapping `CircuitBreaker::call`.
type TimeoutErr = ResilienceError<BreakerErr>;

/// A handler timed out, surfaced as a plain boxed error once resilience
/// wrapping is done with it — `stratum-workflow`'s executor only ever
/// stringifies a node's error for its `node_failed` event (§4.8), so this
/// exists purely to give that string a recognizable shape in logs.
#[derive(Debug)]
struct TimeoutFailure {
    elapsed_ms: u64,
}

impl std::fmt::Display for TimeoutFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node timed out after {}ms", self.elapsed_ms)
    }
}

impl std::error::Error for TimeoutFailure {}

/// A breaker rejected the call without invoking the handler (§4.5 "node
/// failure; not retried").
#[derive(Debug)]
struct CircuitOpenFailure {
    name: String,
}

impl std::fmt::Display for CircuitOpenFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "circuit {:?} is open", self.name)
    }
}

impl std::error::Error for CircuitOpenFailure {}

fn flatten_breaker_err(err: BreakerErr) -> HandlerErr {
    match err {
        ResilienceError::CircuitOpen { name } => Box::new(CircuitOpenFailure { name }),
        ResilienceError::Timeout { elapsed_ms } => Box::new(TimeoutFailure { elapsed_ms }),
        ResilienceError::Operation(handler_err) => handler_err,
    }
}

fn flatten_timeout_err(err: TimeoutErr) -> HandlerErr {
    match err {
        ResilienceError::Timeout { elapsed_ms } => Box::new(TimeoutFailure { elapsed_ms }),
        ResilienceError::CircuitOpen { name } => Box::new(CircuitOpenFailure { name }),
        ResilienceError::Operation(breaker_err) => flatten_breaker_err(breaker_err),
    }
}

/// Whether a `providers` node's wrapped failure (timeout around the
/// breaker call) is worth retrying (§4.5, §8 property 5/6).
///
/// `CircuitOpenError` is never retryable — retrying would immediately
/// re-fail against the same open breaker. A `TimeoutError` is retryable
/// (the category allows it). Anything the handler itself raised defers to
/// [`Retryable`] if it implemented that, defaulting to retryable — the
/// spec's "default: transient network/timeout kinds" reads most naturally
/// as "assume transient unless told otherwise" for a provider fetch.
fn is_provider_error_retryable(err: &TimeoutErr) -> bool {
    match err {
        ResilienceError::Timeout { .. } => true,
        ResilienceError::CircuitOpen { .. } => false,
        ResilienceError::Operation(breaker_err) => match breaker_err {
            ResilienceError::CircuitOpen { .. } => false,
            ResilienceError::Timeout { .. } => true,
            ResilienceError::Operation(handler_err) => handler_err
                .downcast_ref::<NodeFailure>()
                .map(Retryable::is_retryable)
                .unwrap_or(true),
        },
    }
}

/// `providers`: `WithRetry(WithTimeout(Breaker.call(handler)))` (§4.9).
struct ProviderHandler {
    inner: Arc<dyn NodeHandler>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

#[async_trait]
impl NodeHandler for ProviderHandler {
    async fn handle(
        &self,
        inputs: HashMap<String, Value>,
        properties: HashMap<String, Value>,
        ctx: NodeContext,
    ) -> Result<HashMap<String, Value>, HandlerErr> {
        let result = with_retry(self.retry_policy, is_provider_error_retryable, || {
            let inner = self.inner.clone();
            let breaker = self.breaker.clone();
            let inputs = inputs.clone();
            let properties = properties.clone();
            let ctx = ctx.clone();
            let timeout = self.timeout;
            async move { with_timeout(timeout, breaker.call(inner.handle(inputs, properties, ctx))).await }
        })
        .await;

        result.map_err(|err| match err {
            ResilienceError::Operation(timeout_err) => flatten_timeout_err(timeout_err),
            ResilienceError::Timeout { elapsed_ms } => Box::new(TimeoutFailure { elapsed_ms }),
            ResilienceError::CircuitOpen { name } => Box::new(CircuitOpenFailure { name }),
        })
    }
}

/// `triggers, conditions, actions`: `WithTimeout(handler)` only — actions
/// are not idempotent, so no retry (§4.9).
struct TimeoutOnlyHandler {
    inner: Arc<dyn NodeHandler>,
    timeout: Duration,
}

#[async_trait]
impl NodeHandler for TimeoutOnlyHandler {
    async fn handle(
        &self,
        inputs: HashMap<String, Value>,
        properties: HashMap<String, Value>,
        ctx: NodeContext,
    ) -> Result<HashMap<String, Value>, HandlerErr> {
        with_timeout(self.timeout, self.inner.handle(inputs, properties, ctx))
            .await
            .map_err(flatten_breaker_err_from_timeout)
    }
}

fn flatten_breaker_err_from_timeout(err: ResilienceError<HandlerErr>) -> HandlerErr {
    match err {
        ResilienceError::Timeout { elapsed_ms } => Box::new(TimeoutFailure { elapsed_ms }),
        ResilienceError::CircuitOpen { name } => Box::new(CircuitOpenFailure { name }),
        ResilienceError::Operation(handler_err) => handler_err,
    }
}

/// `risk`: `WithTimeout(handler)`, plus reporting an exceeded limit to the
/// emergency controller (§4.9 step 5 "risk").
///
/// The node's output is the handler-author's own convention; this wrapper
/// looks for `limit_name` (string) and `current_value` (number) keys in
/// the returned output map and, when both are present, reports them via
/// `EmergencyController::check_limit`. A risk node that reports nothing
/// recognizable is left alone — it is not every risk node's job to drive
/// the emergency controller.
struct RiskHandler {
    inner: Arc<dyn NodeHandler>,
    timeout: Duration,
    emergency: Arc<EmergencyController>,
}

#[async_trait]
impl NodeHandler for RiskHandler {
    async fn handle(
        &self,
        inputs: HashMap<String, Value>,
        properties: HashMap<String, Value>,
        ctx: NodeContext,
    ) -> Result<HashMap<String, Value>, HandlerErr> {
        let output = with_timeout(self.timeout, self.inner.handle(inputs, properties, ctx))
            .await
            .map_err(flatten_breaker_err_from_timeout)?;

        if let (Some(name), Some(current_value)) = (
            output.get("limit_name").and_then(Value::as_str),
            output.get("current_value").and_then(Value::as_f64),
        ) {
            match self.emergency.check_limit(name, current_value).await {
                Ok(outcome) if !outcome.ok => {
                    tracing::warn!(limit = name, current_value, "risk node reported a breached limit");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(limit = name, error = %err, "risk node referenced an unregistered limit");
                }
            }
        }

        Ok(output)
    }
}

/// The synthetic, per-node dispatch key a specialized [`WorkflowDefinition`]
/// routes through, so two nodes sharing `(category, type)` can still carry
/// distinct per-node timeouts and distinct wrapped handler instances.
#[must_use]
pub fn dispatch_key(node_id: &str, node_type: &str) -> String {
    format!("{node_type}@{node_id}")
}

/// Clone `definition`, rewriting every node's `type` to its [`dispatch_key`]
/// so it can be dispatched against the registry [`build_resilient_registry`]
/// returns. Node ids, categories, properties, and edges are unchanged.
#[must_use]
pub fn specialize(definition: &WorkflowDefinition) -> WorkflowDefinition {
    let nodes = definition
        .nodes
        .iter()
        .map(|node| {
            let mut specialized = node.clone();
            specialized.node_type = dispatch_key(&node.id, &node.node_type);
            specialized
        })
        .collect();
    WorkflowDefinition::new(nodes, definition.edges.clone())
}

/// Build the per-execution registry: one resilience-wrapped handler per
/// node in `definition`, looked up from `raw` by the node's original
/// `(category, type)` and re-registered under its [`dispatch_key`].
///
/// A node whose `(category, type)` has no entry in `raw` is simply skipped
/// — the specialized registry has no entry for it either, so the executor
/// reports `NoHandler` for that node exactly as it would have without any
/// wrapping (§4.8).
#[must_use]
pub fn build_resilient_registry(
    definition: &WorkflowDefinition,
    raw: &HandlerRegistry,
    breaker: Arc<CircuitBreaker>,
    emergency: Arc<EmergencyController>,
    retry_policy: RetryPolicy,
    default_timeout: Duration,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for node in &definition.nodes {
        let Some(handler) = raw.lookup(node.category, &node.node_type) else {
            continue;
        };
        let timeout = node.timeout.map(Duration::from_secs).unwrap_or(default_timeout);
        let wrapped: Arc<dyn NodeHandler> = match node.category {
            NodeCategory::Providers => Arc::new(ProviderHandler {
                inner: handler,
                breaker: breaker.clone(),
                timeout,
                retry_policy,
            }),
            NodeCategory::Risk => Arc::new(RiskHandler {
                inner: handler,
                timeout,
                emergency: emergency.clone(),
            }),
            NodeCategory::Triggers | NodeCategory::Conditions | NodeCategory::Actions => {
                Arc::new(TimeoutOnlyHandler { inner: handler, timeout })
            }
        };
        registry.register(node.category, dispatch_key(&node.id, &node.node_type), wrapped);
    }
    registry
}
