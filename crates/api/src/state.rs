//! [`ApiState`] — shared state every HTTP/WebSocket handler reads (§4.10).

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::replay::ReplayBuffer;
use crate::session::Session;
use stratum_config::Settings;
use stratum_infra::Infra;

/// Shared across every connection and HTTP request this process serves.
pub struct ApiState {
    pub infra: Arc<Infra>,
    pub sessions: DashMap<Uuid, Arc<Session>>,
    pub replay: ReplayBuffer,
    pub metrics: Metrics,
    pub started_at: Instant,
    pub require_auth: bool,
    pub auth_token: Option<String>,
    /// Fired once, at shutdown, to make every connected session's socket
    /// send a close frame and return (SPEC_FULL "Graceful shutdown").
    pub shutdown: broadcast::Sender<()>,
}

impl ApiState {
    #[must_use]
    pub fn new(infra: Arc<Infra>, settings: &Settings) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            infra,
            sessions: DashMap::new(),
            replay: ReplayBuffer::new(settings.recent_events_capacity),
            metrics: Metrics::default(),
            started_at: Instant::now(),
            require_auth: settings.require_auth,
            auth_token: settings.auth_token.clone(),
            shutdown,
        }
    }

    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
