//! # Stratum State
//!
//! The pluggable key/value state store (C3): `Set`/`Get`/`Delete`/`Exists`/
//! `ListKeys` over opaque JSON values, with `memory` and (behind the
//! `redis-backend` feature) `redis` variants. Callers never see which
//! backend is in use.

mod error;
mod memory;
mod store;

#[cfg(feature = "redis-backend")]
mod redis_store;

pub use error::StateError;
pub use memory::MemoryStateStore;
pub use store::StateStore;

#[cfg(feature = "redis-backend")]
pub use redis_store::RedisStateStore;
