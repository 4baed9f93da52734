//! The enhanced workflow runtime (C9, §4.9): wraps
//! [`stratum_workflow::GraphExecutor`] with per-node resilience, the
//! emergency controller's mid-run trading gate, ambient correlation, and
//! state/event persistence at each milestone.

mod error;
mod observer;
mod resilient;
mod runtime;

pub use error::RuntimeError;
pub use observer::RuntimeObserver;
pub use resilient::{build_resilient_registry, dispatch_key, specialize};
pub use runtime::WorkflowRuntime;
