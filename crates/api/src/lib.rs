//! # Stratum API
//!
//! The WebSocket fan-out server (C10, §4.10): authenticates browser
//! clients, routes `stratum-events` workflow lifecycle events (and the
//! emergency controller's global state transitions) to per-session
//! subscription filters, replays a bounded buffer of recent events to new
//! subscribers, and exposes `/status`, `/health`, `/metrics` (plus a
//! supplemental Prometheus `/metrics/prometheus`) over HTTP.
//!
//! Holds no workflow-execution logic of its own — it exists only to
//! project the event bus outward to browser clients (§1).

mod error;
mod fanout;
mod http;
mod metrics;
mod protocol;
mod replay;
mod server;
mod session;
mod state;
mod ws;

pub use error::ApiError;
pub use protocol::{ClientMessage, FilterKind, ServerMessage};
pub use server::{build_router, run, Server};
pub use state::ApiState;
