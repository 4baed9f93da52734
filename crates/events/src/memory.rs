//! In-process [`EventBus`] (§4.4): a `DashMap` of subscriptions, each
//! delivered to on its own spawned task via a bounded channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use stratum_core::EventEnvelope;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bus::{EventBus, SubscriptionId};
use crate::error::EventBusError;
use crate::glob;
use crate::handler::EventHandler;

/// Default bounded capacity of a subscriber's delivery queue (§4.4).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum Kind {
    Exact(String),
    Pattern(String),
}

struct Subscription {
    kind: Kind,
    sender: mpsc::Sender<EventEnvelope>,
    task: JoinHandle<()>,
    dropped_events: Arc<AtomicU64>,
}

/// An in-process, in-memory event bus.
pub struct MemoryEventBus {
    subscriptions: DashMap<Uuid, Subscription>,
    queue_capacity: usize,
}

impl MemoryEventBus {
    /// Build a bus whose subscriber queues hold [`DEFAULT_QUEUE_CAPACITY`]
    /// events before the oldest-pending delivery is dropped.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Build a bus with a custom per-subscriber queue capacity.
    #[must_use]
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            subscriptions: DashMap::new(),
            queue_capacity,
        }
    }

    /// Number of dropped (overflowed) events for a subscription, if it
    /// still exists.
    #[must_use]
    pub fn dropped_events(&self, id: SubscriptionId) -> Option<u64> {
        self.subscriptions
            .get(&id.0)
            .map(|entry| entry.dropped_events.load(Ordering::Relaxed))
    }

    fn spawn(&self, kind: Kind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel::<EventEnvelope>(self.queue_capacity);
        let dropped_events = Arc::new(AtomicU64::new(0));

        let channel_label = match &kind {
            Kind::Exact(c) => c.clone(),
            Kind::Pattern(p) => p.clone(),
        };
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = handler.handle(event).await {
                    tracing::warn!(
                        channel = %channel_label,
                        error = %err,
                        "event handler returned an error; continuing delivery"
                    );
                }
            }
        });

        self.subscriptions.insert(
            id,
            Subscription {
                kind,
                sender: tx,
                task,
                dropped_events,
            },
        );
        SubscriptionId(id)
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId, EventBusError> {
        Ok(self.spawn(Kind::Exact(channel.to_owned()), handler))
    }

    async fn subscribe_pattern(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId, EventBusError> {
        glob::validate(pattern).map_err(|reason| EventBusError::InvalidPattern {
            pattern: pattern.to_owned(),
            reason,
        })?;
        Ok(self.spawn(Kind::Pattern(pattern.to_owned()), handler))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), EventBusError> {
        if let Some((_, subscription)) = self.subscriptions.remove(&id.0) {
            subscription.task.abort();
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, event: EventEnvelope) -> Result<(), EventBusError> {
        for entry in &self.subscriptions {
            let subscription = entry.value();
            let matched = match &subscription.kind {
                Kind::Exact(expected) => expected == channel,
                Kind::Pattern(pattern) => glob::matches(pattern, channel),
            };
            if !matched {
                continue;
            }
            if subscription.sender.try_send(event.clone()).is_err() {
                subscription.dropped_events.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(channel = %channel, "subscriber queue full, dropping event");
            }
        }
        Ok(())
    }
}

impl Drop for MemoryEventBus {
    fn drop(&mut self) {
        for entry in self.subscriptions.iter() {
            entry.value().task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use stratum_core::{BotId, ExecutionId, StrategyId, WorkflowEventType, WorkflowId};

    fn sample_event(channel: &str) -> EventEnvelope {
        let workflow_id = WorkflowId::new("arb_btc");
        EventEnvelope {
            event_type: WorkflowEventType::ExecutionStarted,
            channel: channel.to_string(),
            timestamp: chrono::Utc::now(),
            execution_id: ExecutionId::new(&workflow_id),
            workflow_id,
            bot_id: None::<BotId>,
            strategy_id: None::<StrategyId>,
            payload: serde_json::json!({}),
        }
    }

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(
            &self,
            _event: EventEnvelope,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn exact_subscriber_receives_matching_events_only() {
        let bus = MemoryEventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "workflow:arb_btc:events",
            Arc::new(CountingHandler { count: count.clone() }),
        )
        .await
        .unwrap();

        bus.publish("workflow:arb_btc:events", sample_event("workflow:arb_btc:events"))
            .await
            .unwrap();
        bus.publish("workflow:eth_usd:events", sample_event("workflow:eth_usd:events"))
            .await
            .unwrap();
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pattern_subscriber_matches_glob() {
        let bus = MemoryEventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe_pattern(
            "workflow:*:events",
            Arc::new(CountingHandler { count: count.clone() }),
        )
        .await
        .unwrap();

        bus.publish("workflow:arb_btc:events", sample_event("workflow:arb_btc:events"))
            .await
            .unwrap();
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = MemoryEventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = bus
            .subscribe(
                "workflow:arb_btc:events",
                Arc::new(CountingHandler { count: count.clone() }),
            )
            .await
            .unwrap();

        bus.unsubscribe(id).await.unwrap();
        bus.publish("workflow:arb_btc:events", sample_event("workflow:arb_btc:events"))
            .await
            .unwrap();
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn overflow_drops_and_counts_instead_of_blocking_publisher() {
        let bus = MemoryEventBus::with_capacity(1);
        let count = Arc::new(AtomicUsize::new(0));
        // A handler that never returns keeps the queue backed up.
        struct StallingHandler;
        #[async_trait]
        impl EventHandler for StallingHandler {
            async fn handle(
                &self,
                _event: EventEnvelope,
            ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }
        let _ = &count;
        let id = bus
            .subscribe("workflow:arb_btc:events", Arc::new(StallingHandler))
            .await
            .unwrap();

        for _ in 0..5 {
            bus.publish("workflow:arb_btc:events", sample_event("workflow:arb_btc:events"))
                .await
                .unwrap();
        }

        assert!(bus.dropped_events(id).unwrap() > 0);
    }
}
