//! The standing event-bus subscriptions that project `stratum-events`
//! outward to every connected session (§1, §4.10 "fan-out").

use std::sync::Arc;

use async_trait::async_trait;
use stratum_core::EventEnvelope;
use stratum_emergency::EMERGENCY_EVENTS_CHANNEL;
use stratum_events::{EventBusError, EventHandler};

use crate::state::ApiState;

/// Whether a fan-out handler broadcasts unconditionally — the emergency
/// channel, per [`stratum_emergency::EMERGENCY_EVENTS_CHANNEL`]'s own doc
/// comment: "the WebSocket fan-out (C10) holds a second, dedicated
/// subscription on this channel and broadcasts it to every authenticated
/// session regardless of their per-workflow filters" — or routes through
/// each session's subscription filters (the per-workflow events channel).
#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Broadcast,
    Filtered,
}

struct FanoutHandler {
    state: Arc<ApiState>,
    scope: Scope,
}

#[async_trait]
impl EventHandler for FanoutHandler {
    async fn handle(
        &self,
        event: EventEnvelope,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state.metrics.event_received();

        if self.scope == Scope::Filtered {
            self.state.replay.push(event.clone());
        }

        for entry in &self.state.sessions {
            let session = entry.value();
            if self.state.require_auth && !session.is_authenticated() {
                continue;
            }
            let outcome = session.deliver_if_matching(&event, self.scope == Scope::Broadcast);
            match outcome {
                Some(true) => self.state.metrics.event_sent(),
                Some(false) => self.state.metrics.dropped(),
                None => {}
            }
        }

        Ok(())
    }
}

/// Subscribe the fan-out handler to both channels the runtime (C9) and
/// controller (C6) publish on: `workflow:*:events` (per-execution
/// lifecycle, §4.4 colon-segment glob) and `emergency:events` (global
/// safety-machine transitions).
pub async fn install(state: Arc<ApiState>) -> Result<(), EventBusError> {
    let filtered = Arc::new(FanoutHandler {
        state: state.clone(),
        scope: Scope::Filtered,
    });
    state
        .infra
        .events
        .subscribe_pattern("workflow:*:events", filtered)
        .await?;

    let broadcast = Arc::new(FanoutHandler {
        state,
        scope: Scope::Broadcast,
    });
    broadcast
        .state
        .infra
        .events
        .subscribe(EMERGENCY_EVENTS_CHANNEL, broadcast.clone())
        .await?;

    Ok(())
}
