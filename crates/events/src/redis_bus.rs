//! Redis-backed [`EventBus`] (§4.4).
//!
//! Fan-out across processes goes over Redis pub/sub; within this process,
//! subscription matching (exact and glob) is still performed locally so the
//! same [`crate::glob`] semantics apply regardless of backend. One
//! dedicated connection runs `PSUBSCRIBE *` and redistributes every message
//! to whichever local subscriptions match.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use stratum_core::EventEnvelope;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bus::{EventBus, SubscriptionId};
use crate::error::EventBusError;
use crate::glob;
use crate::handler::EventHandler;
use crate::memory::DEFAULT_QUEUE_CAPACITY;

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

/// An [`EventBus`] that fans events out through Redis pub/sub.
pub struct RedisEventBus {
    publish_conn: ConnectionManager,
    subscriptions: Arc<DashMap<Uuid, Subscription>>,
    queue_capacity: usize,
    _listener: JoinHandle<()>,
}

impl RedisEventBus {
    /// Connect to `url`, start the background listener, and build a bus
    /// around it.
    pub async fn connect(url: &str) -> Result<Self, EventBusError> {
        Self::connect_with_capacity(url, DEFAULT_QUEUE_CAPACITY).await
    }

    /// As [`Self::connect`], with a custom per-subscriber queue capacity.
    pub async fn connect_with_capacity(
        url: &str,
        queue_capacity: usize,
    ) -> Result<Self, EventBusError> {
        let client = redis::Client::open(url).map_err(|e| EventBusError::Backend(e.to_string()))?;
        let publish_conn = client
            .get_connection_manager()
            .await
            .map_err(|e| EventBusError::Backend(e.to_string()))?;

        let subscriptions: Arc<DashMap<Uuid, Subscription>> = Arc::new(DashMap::new());
        let listener_subscriptions = subscriptions.clone();
        let listener_client = client.clone();
        let listener = tokio::spawn(async move {
            loop {
                match listener_client.get_async_pubsub().await {
                    Ok(mut pubsub) => {
                        if pubsub.psubscribe("*").await.is_err() {
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                            continue;
                        }
                        let mut stream = pubsub.on_message();
                        use futures::StreamExt;
                        while let Some(msg) = stream.next().await {
                            let channel: String = msg.get_channel_name().to_string();
                            let payload: String = match msg.get_payload() {
                                Ok(p) => p,
                                Err(_) => continue,
                            };
                            let Ok(event) = serde_json::from_str::<EventEnvelope>(&payload) else {
                                continue;
                            };
                            dispatch(&listener_subscriptions, &channel, event);
                        }
                    }
                    Err(_) => {
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            publish_conn,
            subscriptions,
            queue_capacity,
            _listener: listener,
        })
    }

    fn spawn(&self, kind: Kind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel::<EventEnvelope>(self.queue_capacity);
        let dropped_events = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = handler.handle(event).await {
                    tracing::warn!(error = %err, "event handler returned an error; continuing delivery");
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

fn dispatch(subscriptions: &DashMap<Uuid, Subscription>, channel: &str, event: EventEnvelope) {
    for entry in subscriptions.iter() {
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
}

#[async_trait]
impl EventBus for RedisEventBus {
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
        let encoded =
            serde_json::to_string(&event).map_err(|e| EventBusError::Backend(e.to_string()))?;
        let mut conn = self.publish_conn.clone();
        conn.publish::<_, _, ()>(channel, encoded)
            .await
            .map_err(|e| EventBusError::Backend(e.to_string()))
    }
}
