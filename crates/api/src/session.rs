//! Per-connection session state (§4.10 "connection lifecycle",
//! "subscriptions", "fan-out").
//!
//! A session's outbound queue is single-writer per §5 ("WebSocket
//! sessions"): every send, whether triggered by a client message or by the
//! standing fan-out subscription, goes through [`Session::notify`] or the
//! locked helpers below, never directly against the channel.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use stratum_core::{BotId, EventEnvelope, StrategyId, WorkflowId};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{FilterKind, ServerMessage};
use crate::replay::ReplayBuffer;

/// One subscription filter a session has requested (§4.10).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    Workflow(String),
    Bot(String),
    Strategy(String),
}

impl Filter {
    #[must_use]
    pub fn new(kind: FilterKind, id: String) -> Self {
        match kind {
            FilterKind::Workflow => Self::Workflow(id),
            FilterKind::Bot => Self::Bot(id),
            FilterKind::Strategy => Self::Strategy(id),
        }
    }

    #[must_use]
    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Workflow(_) => FilterKind::Workflow,
            Self::Bot(_) => FilterKind::Bot,
            Self::Strategy(_) => FilterKind::Strategy,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Workflow(id) | Self::Bot(id) | Self::Strategy(id) => id,
        }
    }

    /// Whether `event` references this filter's id (§4.10 "fan-out":
    /// "`workflow_id`, `bot_id`, or `strategy_id` in the payload equals a
    /// subscribed value").
    #[must_use]
    pub fn matches(&self, event: &EventEnvelope) -> bool {
        match self {
            Self::Workflow(id) => event.matches_workflow(&WorkflowId::new(id.clone())),
            Self::Bot(id) => event.matches_bot(&BotId::new(id.clone())),
            Self::Strategy(id) => event.matches_strategy(&StrategyId::new(id.clone())),
        }
    }
}

struct Guarded {
    filters: HashSet<Filter>,
}

/// One connected browser client (§4.10).
pub struct Session {
    pub id: Uuid,
    outbound: mpsc::Sender<ServerMessage>,
    authenticated: AtomicBool,
    /// Guards the filter set and gates every outbound send so a
    /// `subscribe` and a concurrent fan-out delivery can never interleave
    /// out of order: §8 property 8 requires replay to precede any live
    /// event matching the same filter, and holding this lock across both
    /// "add filter + send replay" (here) and "check filters + send live
    /// event" (`deliver_if_matching`) makes that ordering deterministic.
    guarded: Mutex<Guarded>,
}

impl Session {
    #[must_use]
    pub fn new(id: Uuid, outbound: mpsc::Sender<ServerMessage>, authenticated: bool) -> Self {
        Self {
            id,
            outbound,
            authenticated: AtomicBool::new(authenticated),
            guarded: Mutex::new(Guarded {
                filters: HashSet::new(),
            }),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::SeqCst);
    }

    /// Best-effort send; a full or closed queue is the same "slow
    /// subscriber" condition the event bus already tolerates (§4.4) —
    /// silently dropped rather than blocking the caller.
    pub fn notify(&self, message: ServerMessage) {
        let _ = self.outbound.try_send(message);
    }

    /// Record `filter`, then reply `subscribed` and replay whatever in
    /// `buffer` already matches it, all while holding the lock that also
    /// gates live delivery (§8 property 8).
    pub fn subscribe(&self, filter: Filter, buffer: &ReplayBuffer) {
        let mut guarded = self.guarded.lock();
        let buffered = buffer.matching(&filter);
        guarded.filters.insert(filter.clone());
        let _ = self.outbound.try_send(ServerMessage::Subscribed {
            filter: filter.kind(),
            id: filter.id().to_string(),
        });
        let count = buffered.len();
        let _ = self.outbound.try_send(ServerMessage::RecentEvents {
            events: buffered,
            count,
        });
    }

    pub fn unsubscribe(&self, filter: Filter) {
        let mut guarded = self.guarded.lock();
        guarded.filters.remove(&filter);
        let _ = self.outbound.try_send(ServerMessage::Unsubscribed {
            filter: filter.kind(),
            id: filter.id().to_string(),
        });
    }

    /// If `broadcast` or `event` matches one of this session's filters,
    /// enqueue it. Returns `None` when nothing was delivered (no match),
    /// `Some(true)` on a successful enqueue, `Some(false)` when delivery
    /// was attempted but the queue rejected it (dropped).
    pub fn deliver_if_matching(&self, event: &EventEnvelope, broadcast: bool) -> Option<bool> {
        let guarded = self.guarded.lock();
        let deliver = broadcast || guarded.filters.iter().any(|f| f.matches(event));
        if !deliver {
            return None;
        }
        let sent = self
            .outbound
            .try_send(ServerMessage::WorkflowEvent {
                payload: event.clone(),
            })
            .is_ok();
        Some(sent)
    }

    #[must_use]
    pub fn filter_count(&self) -> usize {
        self.guarded.lock().filters.len()
    }
}
