//! Graph executor errors (§4.8, §7).

use thiserror::Error;

/// Errors raised by [`crate::graph::Graph::from_definition`] or
/// [`crate::executor::GraphExecutor::run`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The workflow's induced directed graph is not acyclic. Execution
    /// fails immediately; no node events are emitted (§4.8, §8 property 4
    /// style "no dispatch before failure").
    #[error("workflow graph contains a cycle: {nodes:?}")]
    Cycle {
        /// The node ids participating in the cycle.
        nodes: Vec<String>,
    },

    /// An edge references a node id that does not exist. Structural
    /// validation is normally caught earlier by
    /// [`stratum_core::WorkflowDefinition::validate_shape`], but the graph
    /// re-checks it since it is constructed straight from the edge list.
    #[error("edge references unknown node: {0}")]
    UnknownNode(String),
}

/// A node-level failure reported by a dispatched handler.
///
/// `NoHandler` is distinguished from a handler's own error because it is a
/// structural problem with the workflow (no node implementation was
/// registered for `(category, type)`), not a runtime failure of an
/// otherwise-valid node (§4.8, §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// No handler is registered for this node's `(category, type)` pair.
    #[error("no handler registered for {category}/{node_type}")]
    NoHandler {
        /// The node's category.
        category: String,
        /// The node's type within that category.
        node_type: String,
    },

    /// The handler itself returned an error.
    #[error("{0}")]
    Handler(String),
}
