//! # Stratum Events
//!
//! The publish/subscribe event bus (C4): exact and colon-segment glob
//! pattern subscriptions over [`stratum_core::EventEnvelope`], with
//! `memory` and (behind `redis-backend`) `redis` variants.

mod bus;
mod error;
mod glob;
mod handler;
mod memory;

#[cfg(feature = "redis-backend")]
mod redis_bus;

pub use bus::{EventBus, SubscriptionId};
pub use error::EventBusError;
pub use handler::EventHandler;
pub use memory::{MemoryEventBus, DEFAULT_QUEUE_CAPACITY};

#[cfg(feature = "redis-backend")]
pub use redis_bus::RedisEventBus;
