//! # Stratum Infra
//!
//! The infrastructure assembly (C7): one [`Infra`] object aggregating
//! fully-initialized state store, event bus, and emergency controller
//! instances plus a named circuit-breaker factory, with a single
//! `initialize`/`shutdown` lifecycle (§4.7). Every other Stratum subsystem
//! receives this object by reference and never constructs its own backend.

mod assembly;
mod error;
mod registry;

pub use assembly::Infra;
pub use error::InfraError;
pub use registry::CircuitBreakerRegistry;
