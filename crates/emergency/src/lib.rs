//! # Stratum Emergency
//!
//! The emergency controller (C6): a four-state safety machine
//! (`Normal → Alert → Halt → Shutdown`) plus a named risk-limit registry
//! that can auto-halt the process on breach (§4.6).
//!
//! The controller is a process-wide singleton under the infrastructure
//! assembly (§3, §4.7); every other component holds only a shared
//! reference, never its own copy.

mod controller;
mod error;
mod limits;
mod log;
mod state;

pub use controller::{EmergencyController, EmergencySnapshot, EMERGENCY_EVENTS_CHANNEL};
pub use error::EmergencyError;
pub use limits::{CheckOutcome, RiskLimit, RiskLimitTable};
pub use log::{EmergencyEventLog, EmergencyTransition};
pub use state::{can_transition, EmergencyState};
