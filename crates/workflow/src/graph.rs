//! [`Graph`] — the induced directed graph of a [`WorkflowDefinition`],
//! built once per run for cycle detection and predecessor resolution
//! (§4.8).

use std::collections::HashMap;

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use stratum_core::{Node, WorkflowDefinition};

use crate::error::GraphError;

/// One resolved incoming connection: `from_node_id`'s `from_output_index`
/// feeds this node's `to_input_index`.
#[derive(Debug, Clone)]
pub struct Incoming {
    /// The upstream node id.
    pub from_node_id: String,
    /// The upstream node's output port.
    pub from_output_index: usize,
    /// This node's input port.
    pub to_input_index: usize,
}

/// The acyclic graph induced by a workflow's nodes and edges, plus the
/// indices `stratum-runtime`'s executor needs to dispatch it: predecessors
/// (for input resolution), successors (for skip cascades), and in-degree
/// (for readiness).
pub struct Graph {
    node_ids: Vec<String>,
    predecessors: HashMap<String, Vec<Incoming>>,
    successors: HashMap<String, Vec<String>>,
}

impl Graph {
    /// Build the graph from a workflow definition, failing with
    /// [`GraphError::Cycle`] if the induced graph is not acyclic (§4.8).
    ///
    /// Does not re-run [`WorkflowDefinition::validate_shape`] — callers are
    /// expected to have validated node-id uniqueness and edge endpoints
    /// already; this only rejects cycles it cannot schedule around.
    pub fn from_definition(definition: &WorkflowDefinition) -> Result<Self, GraphError> {
        let mut graph = DiGraph::<String, ()>::new();
        let mut index_of: HashMap<String, NodeIndex> = HashMap::new();

        for node in &definition.nodes {
            let idx = graph.add_node(node.id.clone());
            index_of.insert(node.id.clone(), idx);
        }

        for edge in &definition.edges {
            let from = *index_of
                .get(&edge.from_node_id)
                .ok_or_else(|| GraphError::UnknownNode(edge.from_node_id.clone()))?;
            let to = *index_of
                .get(&edge.to_node_id)
                .ok_or_else(|| GraphError::UnknownNode(edge.to_node_id.clone()))?;
            graph.add_edge(from, to, ());
        }

        if let Some(cycle_nodes) = find_cycle(&graph) {
            return Err(GraphError::Cycle { nodes: cycle_nodes });
        }

        let mut predecessors: HashMap<String, Vec<Incoming>> = definition
            .nodes
            .iter()
            .map(|n| (n.id.clone(), Vec::new()))
            .collect();
        let mut successors: HashMap<String, Vec<String>> = definition
            .nodes
            .iter()
            .map(|n| (n.id.clone(), Vec::new()))
            .collect();

        for edge in &definition.edges {
            predecessors
                .get_mut(&edge.to_node_id)
                .expect("validated above")
                .push(Incoming {
                    from_node_id: edge.from_node_id.clone(),
                    from_output_index: edge.from_output_index,
                    to_input_index: edge.to_input_index,
                });
            successors
                .get_mut(&edge.from_node_id)
                .expect("validated above")
                .push(edge.to_node_id.clone());
        }

        for incoming in predecessors.values_mut() {
            incoming.sort_by_key(|i| i.to_input_index);
        }

        Ok(Self {
            node_ids: definition.nodes.iter().map(|n| n.id.clone()).collect(),
            predecessors,
            successors,
        })
    }

    /// Every node id in the workflow, in author order.
    #[must_use]
    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    /// The resolved incoming connections for `node_id`, ordered by
    /// `to_input_index` — the order the executor resolves inputs in
    /// (§4.8 "Dispatch").
    #[must_use]
    pub fn predecessors(&self, node_id: &str) -> &[Incoming] {
        self.predecessors.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// The node ids that depend directly on `node_id`'s output.
    #[must_use]
    pub fn successors(&self, node_id: &str) -> &[String] {
        self.successors.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// Node ids with no predecessors.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<&str> {
        self.node_ids
            .iter()
            .map(String::as_str)
            .filter(|id| self.predecessors(id).is_empty())
            .collect()
    }
}

fn find_cycle(graph: &DiGraph<String, ()>) -> Option<Vec<String>> {
    kosaraju_scc(graph).into_iter().find_map(|component| {
        let in_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&idx| graph.find_edge(idx, idx).is_some());
        in_cycle.then(|| {
            let mut ids: Vec<String> = component.into_iter().map(|idx| graph[idx].clone()).collect();
            ids.sort();
            ids
        })
    })
}

/// Collect a node's properties as the plain map the handler contract
/// expects, without exposing [`Node`] internals to callers that only need
/// to dispatch it (§6).
#[must_use]
pub fn node_properties(node: &Node) -> std::collections::HashMap<String, serde_json::Value> {
    node.properties.clone()
}
