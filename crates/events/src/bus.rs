//! The [`EventBus`] trait every backend implements (§4.4).

use async_trait::async_trait;
use stratum_core::EventEnvelope;

use crate::error::EventBusError;
use crate::handler::EventHandler;

/// Identifies a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) uuid::Uuid);

/// A pluggable publish/subscribe event bus.
///
/// Delivery is fire-and-forget: `publish` returns once delivery has been
/// scheduled to each matching subscriber, not once every subscriber has
/// processed the event. Each subscriber is driven by an independent
/// cooperative task, so one slow or failing handler never blocks another
/// subscriber or the publisher.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Subscribe to an exact channel name.
    async fn subscribe(
        &self,
        channel: &str,
        handler: std::sync::Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId, EventBusError>;

    /// Subscribe to every channel matching a colon-segment glob (§4.4).
    async fn subscribe_pattern(
        &self,
        pattern: &str,
        handler: std::sync::Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId, EventBusError>;

    /// Cancel a subscription created by `subscribe` or `subscribe_pattern`.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), EventBusError>;

    /// Publish `event` on `channel`.
    async fn publish(&self, channel: &str, event: EventEnvelope) -> Result<(), EventBusError>;
}
