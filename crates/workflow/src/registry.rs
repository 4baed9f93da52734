//! [`HandlerRegistry`] — maps a node's `(category, type)` to the
//! implementation that dispatches it.

use std::collections::HashMap;
use std::sync::Arc;

use stratum_core::NodeCategory;

use crate::node_handler::NodeHandler;

/// A lookup table from `(category, node type)` to the [`NodeHandler`] that
/// implements it. Built once at startup and shared across runs.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<(NodeCategory, String), Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `(category, node_type)`. A later call with
    /// the same key replaces the earlier one.
    pub fn register(
        &mut self,
        category: NodeCategory,
        node_type: impl Into<String>,
        handler: Arc<dyn NodeHandler>,
    ) {
        self.handlers.insert((category, node_type.into()), handler);
    }

    /// Look up the handler for a node's `(category, type)`, if any is
    /// registered.
    #[must_use]
    pub fn lookup(&self, category: NodeCategory, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&(category, node_type.to_string())).cloned()
    }
}
