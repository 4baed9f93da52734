//! # Stratum Config
//!
//! Typed, environment-selectable settings (C1) consumed by every other
//! `stratum-*` component. One [`Settings`] value is loaded once at process
//! start by [`Settings::load`] and handed to [`stratum_infra`](../stratum_infra)
//! by reference; nothing downstream reads environment variables directly.

mod error;
mod settings;

pub use error::ConfigError;
pub use settings::{BackendKind, Environment, Settings};
