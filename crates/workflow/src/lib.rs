//! # Stratum Workflow
//!
//! The DAG-scheduled graph executor (C8): given a
//! [`stratum_core::WorkflowDefinition`] and a [`registry::HandlerRegistry`],
//! dispatches nodes in dependency order, running every round's ready set
//! concurrently and cascading `not_executed` to anything downstream of a
//! failure (§4.8).
//!
//! This crate is domain-agnostic: it knows nothing about events, state
//! persistence, or the emergency controller. It reports lifecycle through
//! [`observer::NodeObserver`] and leaves the translation into workflow-level
//! events and resilience wrapping to `stratum-runtime`.

mod error;
mod executor;
mod graph;
mod node_handler;
mod observer;
mod registry;

pub use error::{GraphError, NodeError};
pub use executor::{GraphExecutor, GraphOutcome, RunEnvironment};
pub use graph::{Graph, Incoming};
pub use node_handler::{NodeContext, NodeFailure, NodeHandler};
pub use observer::{NoopObserver, NodeObserver};
pub use registry::HandlerRegistry;
