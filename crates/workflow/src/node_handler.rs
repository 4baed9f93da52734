//! [`NodeHandler`] — the contract node implementations fulfil (§6).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stratum_events::EventBus;
use stratum_resilience::Retryable;
use tokio_util::sync::CancellationToken;

/// Per-dispatch context handed to a [`NodeHandler`]: cooperative
/// cancellation and a reference to the event bus for handlers that need to
/// publish auxiliary events of their own (§6 "handlers may publish events").
///
/// Deliberately thin — it does not carry the full `Infra` aggregate, so
/// this crate stays independent of `stratum-infra` and testable with a
/// bare in-memory event bus.
#[derive(Clone)]
pub struct NodeContext {
    /// The workflow execution this node is running under.
    pub execution_id: String,
    /// The node's own id.
    pub node_id: String,
    /// Cancelled when the run is cancelled (`Runtime::Cancel`, §4.9).
    pub cancellation: CancellationToken,
    /// Shared event bus, for handlers that emit their own events.
    pub events: Arc<dyn EventBus>,
}

/// A node implementation. Inputs and outputs are keyed by stringified port
/// index (`"0"`, `"1"`, ...) to reconcile [`stratum_core::Edge`]'s numeric
/// ports with the map-shaped handler contract in §6.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Run the node against its resolved inputs and authored properties.
    ///
    /// Returns the node's outputs keyed by output port index, or an error
    /// that the executor reports as `node_failed` (§4.8).
    async fn handle(
        &self,
        inputs: HashMap<String, Value>,
        properties: HashMap<String, Value>,
        ctx: NodeContext,
    ) -> Result<HashMap<String, Value>, Box<dyn std::error::Error + Send + Sync>>;
}

/// A handler error that knows whether retrying it is worth attempting
/// (§4.5 "retryable_errors (default: transient network/timeout kinds)").
///
/// Handlers are not required to use this — any boxed `std::error::Error`
/// is a valid return value — but provider handlers that distinguish a
/// transient network hiccup from a permanent rejection (bad credentials,
/// malformed request) should return this so `stratum-runtime`'s retry
/// wrapper (§4.9) can tell them apart instead of retrying everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    message: String,
    retryable: bool,
}

impl NodeFailure {
    /// A failure worth retrying, e.g. a connection reset or upstream 5xx.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that will not resolve itself on a fresh attempt, e.g. a
    /// validation error or an authentication rejection.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl std::fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for NodeFailure {}

impl Retryable for NodeFailure {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

#[async_trait]
impl<F, Fut> NodeHandler for F
where
    F: Fn(HashMap<String, Value>, HashMap<String, Value>, NodeContext) -> Fut + Send + Sync,
    Fut: std::future::Future<
            Output = Result<HashMap<String, Value>, Box<dyn std::error::Error + Send + Sync>>,
        > + Send,
{
    async fn handle(
        &self,
        inputs: HashMap<String, Value>,
        properties: HashMap<String, Value>,
        ctx: NodeContext,
    ) -> Result<HashMap<String, Value>, Box<dyn std::error::Error + Send + Sync>> {
        self(inputs, properties, ctx).await
    }
}
