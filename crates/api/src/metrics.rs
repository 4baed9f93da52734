//! In-process counters for `/metrics` and the supplemental
//! `/metrics/prometheus` (§4.10, SPEC_FULL "Prometheus text exposition").

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters and live gauges the fan-out server exposes (§4.10:
/// "current clients, total connections, events received from bus, events
/// sent to clients, subscription totals, recent buffer size").
#[derive(Default)]
pub struct Metrics {
    total_connections: AtomicU64,
    events_received: AtomicU64,
    events_sent: AtomicU64,
    subscriptions_total: AtomicU64,
    dropped_sends: AtomicU64,
}

impl Metrics {
    pub fn client_connected(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_sent(&self) {
        self.events_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscribed(&self) {
        self.subscriptions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) {
        self.dropped_sends.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_sent: self.events_sent.load(Ordering::Relaxed),
            subscriptions_total: self.subscriptions_total.load(Ordering::Relaxed),
            dropped_sends: self.dropped_sends.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub total_connections: u64,
    pub events_received: u64,
    pub events_sent: u64,
    pub subscriptions_total: u64,
    pub dropped_sends: u64,
}

impl MetricsSnapshot {
    /// Render as Prometheus text exposition format.
    #[must_use]
    pub fn to_prometheus(&self, current_clients: usize, recent_buffer_size: usize) -> String {
        format!(
            "# HELP stratum_ws_total_connections Total WebSocket connections accepted.\n\
             # TYPE stratum_ws_total_connections counter\n\
             stratum_ws_total_connections {}\n\
             # HELP stratum_ws_current_clients Currently connected WebSocket clients.\n\
             # TYPE stratum_ws_current_clients gauge\n\
             stratum_ws_current_clients {}\n\
             # HELP stratum_ws_events_received_total Events received from the event bus.\n\
             # TYPE stratum_ws_events_received_total counter\n\
             stratum_ws_events_received_total {}\n\
             # HELP stratum_ws_events_sent_total Events forwarded to clients.\n\
             # TYPE stratum_ws_events_sent_total counter\n\
             stratum_ws_events_sent_total {}\n\
             # HELP stratum_ws_subscriptions_total Subscription requests accepted.\n\
             # TYPE stratum_ws_subscriptions_total counter\n\
             stratum_ws_subscriptions_total {}\n\
             # HELP stratum_ws_dropped_sends_total Messages dropped to a full session queue.\n\
             # TYPE stratum_ws_dropped_sends_total counter\n\
             stratum_ws_dropped_sends_total {}\n\
             # HELP stratum_ws_recent_buffer_size Current size of the replay buffer.\n\
             # TYPE stratum_ws_recent_buffer_size gauge\n\
             stratum_ws_recent_buffer_size {}\n",
            self.total_connections,
            current_clients,
            self.events_received,
            self.events_sent,
            self.subscriptions_total,
            self.dropped_sends,
            recent_buffer_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::default();
        metrics.client_connected();
        metrics.client_connected();
        metrics.event_received();
        metrics.event_sent();
        metrics.subscribed();
        metrics.dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.events_received, 1);
        assert_eq!(snapshot.events_sent, 1);
        assert_eq!(snapshot.subscriptions_total, 1);
        assert_eq!(snapshot.dropped_sends, 1);
    }

    #[test]
    fn prometheus_exposition_includes_every_series() {
        let snapshot = Metrics::default().snapshot();
        let text = snapshot.to_prometheus(3, 10);
        assert!(text.contains("stratum_ws_current_clients 3"));
        assert!(text.contains("stratum_ws_recent_buffer_size 10"));
        assert!(text.contains("# TYPE stratum_ws_total_connections counter"));
    }
}
