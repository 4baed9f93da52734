//! The [`WorkflowDefinition`] graph shape (§3).
//!
//! This module only knows about the *shape* of a workflow: nodes, edges, and
//! the structural invariant that every edge references an existing node and
//! a valid port index. Acyclicity is a property of the induced graph and is
//! checked by `stratum-workflow`'s topological sort, not here — this crate
//! has no graph-traversal dependency on purpose.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The category of a node, governing which resilience wrappers and safety
/// checks the runtime applies to it (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Market-data / external fetches. Wrapped with retry + circuit breaker + timeout.
    Providers,
    /// Conditions that decide whether a trigger fires.
    Triggers,
    /// Branching logic over upstream outputs.
    Conditions,
    /// Order-placement or other side-effecting operations.
    Actions,
    /// Risk checks that may report into the emergency controller.
    Risk,
}

impl std::fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Providers => "providers",
            Self::Triggers => "triggers",
            Self::Conditions => "conditions",
            Self::Actions => "actions",
            Self::Risk => "risk",
        };
        write!(f, "{s}")
    }
}

/// A single node in a [`WorkflowDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique (within the workflow) node id.
    pub id: String,
    /// The node's category.
    pub category: NodeCategory,
    /// The subtype within the category, e.g. `"rest_poll"` or `"limit_order"`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Human-readable name.
    pub name: String,
    /// Arbitrary configuration the node's handler consumes.
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    /// Optional per-node timeout, in seconds. Falls back to
    /// `default_node_timeout_seconds` when absent (§4.1).
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// A directed edge connecting an output port of one node to an input port of
/// another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub from_node_id: String,
    /// Source output port index.
    pub from_output_index: usize,
    /// Destination node id.
    pub to_node_id: String,
    /// Destination input port index.
    pub to_input_index: usize,
}

/// A user-authored directed graph: market-data fetches, conditional logic,
/// risk checks, and order-placement actions fused into one execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// All nodes in the workflow, in author order.
    pub nodes: Vec<Node>,
    /// All edges in the workflow.
    pub edges: Vec<Edge>,
}

/// Errors raised while validating the structural shape of a workflow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Two nodes share the same id.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    /// An edge references a node id that does not exist.
    #[error("edge references unknown node: {0}")]
    UnknownNode(String),
}

impl WorkflowDefinition {
    /// Construct a new definition without validating it.
    #[must_use]
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Whether the workflow contains at least one node of the given category.
    #[must_use]
    pub fn has_category(&self, category: NodeCategory) -> bool {
        self.nodes.iter().any(|n| n.category == category)
    }

    /// Node ids with no outbound edges — the workflow's terminal nodes.
    ///
    /// A workflow is `failed` iff any terminal node is `failed` or
    /// `not_executed` (§4.8).
    #[must_use]
    pub fn terminal_node_ids(&self) -> Vec<&str> {
        let has_outbound: HashSet<&str> =
            self.edges.iter().map(|e| e.from_node_id.as_str()).collect();
        self.nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| !has_outbound.contains(id))
            .collect()
    }

    /// Validate the structural invariant from §3: every edge endpoint
    /// references an existing node, and node ids are unique.
    ///
    /// Acyclicity is *not* checked here — see
    /// `stratum_workflow::graph::Graph::from_definition`.
    pub fn validate_shape(&self) -> Result<(), WorkflowError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(WorkflowError::DuplicateNodeId(node.id.clone()));
            }
        }
        for edge in &self.edges {
            if self.node(&edge.from_node_id).is_none() {
                return Err(WorkflowError::UnknownNode(edge.from_node_id.clone()));
            }
            if self.node(&edge.to_node_id).is_none() {
                return Err(WorkflowError::UnknownNode(edge.to_node_id.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, category: NodeCategory) -> Node {
        Node {
            id: id.to_string(),
            category,
            node_type: "test".to_string(),
            name: id.to_string(),
            properties: HashMap::new(),
            timeout: None,
        }
    }

    #[test]
    fn validates_chain_of_three() {
        let def = WorkflowDefinition::new(
            vec![
                node("provider_1", NodeCategory::Providers),
                node("condition_1", NodeCategory::Conditions),
                node("action_1", NodeCategory::Actions),
            ],
            vec![
                Edge {
                    from_node_id: "provider_1".into(),
                    from_output_index: 0,
                    to_node_id: "condition_1".into(),
                    to_input_index: 0,
                },
                Edge {
                    from_node_id: "condition_1".into(),
                    from_output_index: 0,
                    to_node_id: "action_1".into(),
                    to_input_index: 0,
                },
            ],
        );
        assert!(def.validate_shape().is_ok());
        assert_eq!(def.terminal_node_ids(), vec!["action_1"]);
        assert!(def.has_category(NodeCategory::Actions));
        assert!(!def.has_category(NodeCategory::Risk));
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let def = WorkflowDefinition::new(
            vec![
                node("a", NodeCategory::Providers),
                node("a", NodeCategory::Actions),
            ],
            vec![],
        );
        assert_eq!(
            def.validate_shape(),
            Err(WorkflowError::DuplicateNodeId("a".into()))
        );
    }

    #[test]
    fn rejects_edge_to_unknown_node() {
        let def = WorkflowDefinition::new(
            vec![node("a", NodeCategory::Providers)],
            vec![Edge {
                from_node_id: "a".into(),
                from_output_index: 0,
                to_node_id: "ghost".into(),
                to_input_index: 0,
            }],
        );
        assert_eq!(
            def.validate_shape(),
            Err(WorkflowError::UnknownNode("ghost".into()))
        );
    }
}
