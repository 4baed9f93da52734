//! # Stratum Core
//!
//! Shared data model for the Stratum workflow engine: identifiers, the
//! [`WorkflowDefinition`] graph shape, [`ExecutionRecord`], the canonical
//! [`EventEnvelope`], and the `state:` key layout.
//!
//! This crate has no async runtime dependency and no behavior beyond simple
//! constructors and validation — it is the vocabulary every other `stratum-*`
//! crate shares.

pub mod envelope;
pub mod execution;
pub mod ids;
pub mod keys;
pub mod workflow;

pub use envelope::EventEnvelope;
pub use execution::{ExecutionError, ExecutionRecord, ExecutionStatus};
pub use ids::{BotId, ExecutionId, StrategyId, WorkflowId};
pub use workflow::{Edge, Node, NodeCategory, WorkflowDefinition, WorkflowError};

/// Common prelude for crates that consume `stratum-core`.
pub mod prelude {
    pub use super::{
        BotId, Edge, EventEnvelope, ExecutionError, ExecutionId, ExecutionRecord, ExecutionStatus,
        Node, NodeCategory, StrategyId, WorkflowDefinition, WorkflowError, WorkflowId,
    };
}
