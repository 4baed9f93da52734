//! The [`EventHandler`] contract a subscriber implements (§4.4).
//!
//! Mirrors the node-handler shape used by `stratum-workflow`: a small
//! async-trait object the bus drives, rather than a bare closure, so
//! subscribers can hold state behind `&self`.

use async_trait::async_trait;
use stratum_core::EventEnvelope;

/// Something that can receive delivered events.
///
/// A handler that returns `Err` is isolated: the bus logs the error and
/// keeps delivering to this subscriber's later events and to every other
/// subscriber (§4.4).
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one delivered event.
    async fn handle(&self, event: EventEnvelope) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(EventEnvelope) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync,
{
    async fn handle(&self, event: EventEnvelope) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self(event)
    }
}
