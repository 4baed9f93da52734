//! [`EmergencyController`] — the process-wide safety authority (C6, §4.6).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratum_core::keys::{EMERGENCY_RISK_LIMITS_KEY, EMERGENCY_STATE_KEY};
use stratum_core::{EventEnvelope, ExecutionId, WorkflowEventType, WorkflowId};
use stratum_events::EventBus;
use stratum_state::StateStore;

use crate::error::EmergencyError;
use crate::limits::{CheckOutcome, RiskLimit, RiskLimitTable};
use crate::log::{EmergencyEventLog, EmergencyTransition};
use crate::state::{can_transition, EmergencyState};

/// The channel the controller publishes `emergency_state_changed` events
/// on. This is deliberately not a per-workflow `workflow:{id}:events`
/// channel — an emergency transition is global, not scoped to one
/// execution — so the WebSocket fan-out (C10) holds a second, dedicated
/// subscription on this channel and broadcasts it to every authenticated
/// session regardless of their per-workflow filters.
pub const EMERGENCY_EVENTS_CHANNEL: &str = "emergency:events";

/// The pseudo-workflow id stamped on emergency events so they can reuse the
/// shared [`EventEnvelope`] shape, which requires a `workflow_id`/
/// `execution_id` pair even though an emergency transition is not scoped to
/// any single execution.
const GLOBAL_WORKFLOW_ID: &str = "_system";

struct Inner {
    state: EmergencyState,
    limits: RiskLimitTable,
    log: EmergencyEventLog,
}

/// A point-in-time view of the controller, for `/health`/`/metrics` and
/// persistence (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencySnapshot {
    /// Current safety state.
    pub state: EmergencyState,
    /// Every registered risk limit.
    pub risk_limits: HashMap<String, RiskLimit>,
}

/// The process-wide safety-machine singleton (§3). Cloned cheaply via
/// `Arc` by every subsystem that needs to consult or mutate it; the
/// infrastructure assembly owns the single instance (§4.7).
pub struct EmergencyController {
    events: Arc<dyn EventBus>,
    state_store: Arc<dyn StateStore>,
    persist_state: bool,
    inner: Mutex<Inner>,
}

impl EmergencyController {
    /// Build a controller starting in `Normal`, with no limits registered.
    /// Call [`Self::restore`] afterward to pick up any persisted state.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventBus>,
        state_store: Arc<dyn StateStore>,
        persist_state: bool,
    ) -> Self {
        Self {
            events,
            state_store,
            persist_state,
            inner: Mutex::new(Inner {
                state: EmergencyState::Normal,
                limits: RiskLimitTable::new(),
                log: EmergencyEventLog::new(),
            }),
        }
    }

    /// Load persisted `(state, risk_limits)` from the state store, if
    /// `persist_state` was configured (§4.1, §4.7). A backend failure is
    /// logged and swallowed — the controller simply starts from defaults,
    /// mirroring the best-effort contract the rest of the state store
    /// honors (§4.3).
    pub async fn restore(&self) {
        if !self.persist_state {
            return;
        }

        match self.state_store.get(EMERGENCY_STATE_KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<EmergencyState>(value) {
                Ok(state) => self.inner.lock().state = state,
                Err(err) => tracing::warn!(error = %err, "failed to decode persisted emergency state"),
            },
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "failed to read persisted emergency state"),
        }

        match self.state_store.get(EMERGENCY_RISK_LIMITS_KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<HashMap<String, RiskLimit>>(value) {
                Ok(limits) => {
                    let mut inner = self.inner.lock();
                    for (name, limit) in limits {
                        inner.limits.register(name, limit.limit_value, limit.auto_halt);
                    }
                }
                Err(err) => tracing::warn!(error = %err, "failed to decode persisted risk limits"),
            },
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "failed to read persisted risk limits"),
        }
    }

    /// Current safety state.
    #[must_use]
    pub fn state(&self) -> EmergencyState {
        self.inner.lock().state
    }

    /// `CanOperate()` (§4.6).
    #[must_use]
    pub fn can_operate(&self) -> bool {
        self.state().can_operate()
    }

    /// `CanTrade()` (§4.6).
    #[must_use]
    pub fn can_trade(&self) -> bool {
        self.state().can_trade()
    }

    /// `AssertCanOperate()` (§4.6).
    pub fn assert_can_operate(&self) -> Result<(), EmergencyError> {
        let state = self.state();
        if state.can_operate() {
            Ok(())
        } else {
            Err(EmergencyError::Halted {
                state,
                reason: "not operating".to_string(),
            })
        }
    }

    /// `AssertCanTrade()` (§4.6).
    pub fn assert_can_trade(&self) -> Result<(), EmergencyError> {
        let state = self.state();
        if state.can_trade() {
            Ok(())
        } else {
            Err(EmergencyError::Halted {
                state,
                reason: "not trading".to_string(),
            })
        }
    }

    /// Move to `Alert`. Valid only from `Normal` (§4.6).
    pub async fn alert(&self, reason: impl Into<String>, metadata: Value) -> Result<(), EmergencyError> {
        self.transition_to(EmergencyState::Alert, reason.into(), metadata).await
    }

    /// Move to `Halt`. Valid from `Normal` or `Alert` (§4.6).
    pub async fn halt(&self, reason: impl Into<String>, metadata: Value) -> Result<(), EmergencyError> {
        self.transition_to(EmergencyState::Halt, reason.into(), metadata).await
    }

    /// Move back to `Normal`. Valid from `Alert` or `Halt` (§4.6).
    pub async fn resume(&self, reason: impl Into<String>, metadata: Value) -> Result<(), EmergencyError> {
        self.transition_to(EmergencyState::Normal, reason.into(), metadata).await
    }

    /// Move to `Shutdown`. Valid from any non-terminal state; terminal
    /// once reached (§4.6).
    pub async fn shutdown(&self, reason: impl Into<String>, metadata: Value) -> Result<(), EmergencyError> {
        self.transition_to(EmergencyState::Shutdown, reason.into(), metadata).await
    }

    async fn transition_to(
        &self,
        to: EmergencyState,
        reason: String,
        metadata: Value,
    ) -> Result<(), EmergencyError> {
        let (from, timestamp) = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            if !can_transition(from, to) {
                return Err(EmergencyError::InvalidTransition { from, to });
            }
            let timestamp = chrono::Utc::now();
            inner.state = to;
            inner.log.push(EmergencyTransition {
                from,
                to,
                reason: reason.clone(),
                timestamp,
                metadata: metadata.clone(),
            });
            (from, timestamp)
        };

        tracing::warn!(%from, %to, %reason, "emergency state transition");
        self.publish_state_changed(from, to, &reason, &metadata, timestamp).await;
        self.persist().await;
        Ok(())
    }

    /// Try to auto-halt from a risk-limit breach. Unlike [`Self::halt`],
    /// this never surfaces [`EmergencyError::InvalidTransition`] — if the
    /// controller is already `Halt` or `Shutdown` the breach is simply
    /// moot, which is the idempotent behavior §8 property/S3 expects on a
    /// repeated `Execute()` without an intervening `Resume`.
    async fn try_auto_halt(&self, reason: String, metadata: Value) {
        if self.transition_to(EmergencyState::Halt, reason, metadata).await.is_err() {
            tracing::debug!("risk limit breached but controller cannot halt from current state");
        }
    }

    /// `RegisterLimit(name, limit_value, auto_halt)` (§4.6).
    pub fn register_limit(&self, name: impl Into<String>, limit_value: f64, auto_halt: bool) {
        self.inner.lock().limits.register(name, limit_value, auto_halt);
    }

    /// `CheckLimit(name, current_value) -> {ok, utilization}` (§4.6).
    ///
    /// Updates the stored `current_value` unconditionally. If this check
    /// crosses into violation and the limit was registered with
    /// `auto_halt = true`, the controller transitions to `Halt` citing the
    /// limit by name.
    pub async fn check_limit(
        &self,
        name: &str,
        current_value: f64,
    ) -> Result<CheckOutcome, EmergencyError> {
        let (outcome, limit) = {
            let mut inner = self.inner.lock();
            inner
                .limits
                .check(name, current_value)
                .ok_or_else(|| EmergencyError::UnknownLimit(name.to_string()))?
        };

        if !outcome.ok && limit.auto_halt {
            let reason = format!(
                "risk limit {name:?} breached: current={current_value}, limit={limit_value}",
                limit_value = limit.limit_value
            );
            self.try_auto_halt(
                reason,
                serde_json::json!({ "limit_name": name, "current_value": current_value, "limit_value": limit.limit_value }),
            )
            .await;
        }

        Ok(outcome)
    }

    /// A registered limit's configuration and last-reported value.
    #[must_use]
    pub fn limit(&self, name: &str) -> Option<RiskLimit> {
        self.inner.lock().limits.get(name).copied()
    }

    /// A point-in-time snapshot of `(state, risk_limits)` (§3).
    #[must_use]
    pub fn snapshot(&self) -> EmergencySnapshot {
        let inner = self.inner.lock();
        EmergencySnapshot {
            state: inner.state,
            risk_limits: inner.limits.all().clone(),
        }
    }

    /// Every recorded transition, oldest first.
    #[must_use]
    pub fn log(&self) -> Vec<EmergencyTransition> {
        self.inner.lock().log.entries().to_vec()
    }

    async fn publish_state_changed(
        &self,
        from: EmergencyState,
        to: EmergencyState,
        reason: &str,
        metadata: &Value,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) {
        let workflow_id = WorkflowId::new(GLOBAL_WORKFLOW_ID);
        let execution_id = ExecutionId::new(&workflow_id);
        let envelope = EventEnvelope::new(
            WorkflowEventType::EmergencyStateChanged,
            execution_id,
            workflow_id,
            None,
            None,
            timestamp,
            serde_json::json!({
                "from": from,
                "to": to,
                "reason": reason,
                "metadata": metadata,
            }),
        );
        if let Err(err) = self.events.publish(EMERGENCY_EVENTS_CHANNEL, envelope).await {
            tracing::warn!(error = %err, "failed to publish emergency_state_changed; continuing");
        }
    }

    async fn persist(&self) {
        if !self.persist_state {
            return;
        }
        let snapshot = self.snapshot();
        if let Err(err) = self
            .state_store
            .set(EMERGENCY_STATE_KEY, serde_json::json!(snapshot.state))
            .await
        {
            tracing::warn!(error = %err, "failed to persist emergency state; continuing");
        }
        if let Err(err) = self
            .state_store
            .set(EMERGENCY_RISK_LIMITS_KEY, serde_json::json!(snapshot.risk_limits))
            .await
        {
            tracing::warn!(error = %err, "failed to persist risk limits; continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_events::MemoryEventBus;
    use stratum_state::MemoryStateStore;

    fn controller() -> EmergencyController {
        EmergencyController::new(
            Arc::new(MemoryEventBus::new()),
            Arc::new(MemoryStateStore::new()),
            false,
        )
    }

    #[tokio::test]
    async fn starts_normal_and_permits_everything() {
        let controller = controller();
        assert_eq!(controller.state(), EmergencyState::Normal);
        assert!(controller.assert_can_operate().is_ok());
        assert!(controller.assert_can_trade().is_ok());
    }

    #[tokio::test]
    async fn halt_forbids_trading_but_not_operating() {
        let controller = controller();
        controller.halt("manual stop", serde_json::json!({})).await.unwrap();
        assert!(controller.assert_can_operate().is_ok());
        assert_eq!(
            controller.assert_can_trade(),
            Err(EmergencyError::Halted {
                state: EmergencyState::Halt,
                reason: "not trading".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn shutdown_is_terminal() {
        let controller = controller();
        controller.shutdown("maintenance", serde_json::json!({})).await.unwrap();
        assert!(controller.assert_can_operate().is_err());
        let err = controller.resume("try to resume", serde_json::json!({})).await;
        assert_eq!(
            err,
            Err(EmergencyError::InvalidTransition {
                from: EmergencyState::Shutdown,
                to: EmergencyState::Normal,
            })
        );
    }

    #[tokio::test]
    async fn halt_then_alert_is_forbidden() {
        let controller = controller();
        controller.halt("stop", serde_json::json!({})).await.unwrap();
        let err = controller.alert("try to downgrade", serde_json::json!({})).await;
        assert_eq!(
            err,
            Err(EmergencyError::InvalidTransition {
                from: EmergencyState::Halt,
                to: EmergencyState::Alert,
            })
        );
    }

    #[tokio::test]
    async fn check_limit_auto_halts_on_breach() {
        let controller = controller();
        controller.register_limit("daily_loss", -100.0, true);
        let outcome = controller.check_limit("daily_loss", -120.0).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(controller.state(), EmergencyState::Halt);
    }

    #[tokio::test]
    async fn check_limit_within_bounds_does_not_halt() {
        let controller = controller();
        controller.register_limit("daily_loss", -100.0, true);
        let outcome = controller.check_limit("daily_loss", -50.0).await.unwrap();
        assert!(outcome.ok);
        assert_eq!(controller.state(), EmergencyState::Normal);
    }

    #[tokio::test]
    async fn check_limit_without_auto_halt_does_not_halt() {
        let controller = controller();
        controller.register_limit("max_position_size", 100_000.0, false);
        let outcome = controller.check_limit("max_position_size", 150_000.0).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(controller.state(), EmergencyState::Normal);
    }

    #[tokio::test]
    async fn check_unregistered_limit_errors() {
        let controller = controller();
        assert_eq!(
            controller.check_limit("unknown", 1.0).await,
            Err(EmergencyError::UnknownLimit("unknown".to_string()))
        );
    }

    #[tokio::test]
    async fn rerunning_check_limit_after_halt_is_idempotent() {
        let controller = controller();
        controller.register_limit("daily_loss", -100.0, true);
        controller.check_limit("daily_loss", -120.0).await.unwrap();
        assert_eq!(controller.state(), EmergencyState::Halt);
        // A second breach report while already halted must not error.
        let outcome = controller.check_limit("daily_loss", -150.0).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(controller.state(), EmergencyState::Halt);
    }

    #[tokio::test]
    async fn log_records_every_transition_in_order() {
        let controller = controller();
        controller.alert("signal", serde_json::json!({})).await.unwrap();
        controller.halt("worse", serde_json::json!({})).await.unwrap();
        controller.resume("all clear", serde_json::json!({})).await.unwrap();
        let log = controller.log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].to, EmergencyState::Alert);
        assert_eq!(log[1].to, EmergencyState::Halt);
        assert_eq!(log[2].to, EmergencyState::Normal);
    }

    #[tokio::test]
    async fn persists_state_when_configured() {
        let store = Arc::new(MemoryStateStore::new());
        let controller =
            EmergencyController::new(Arc::new(MemoryEventBus::new()), store.clone(), true);
        controller.halt("stop", serde_json::json!({})).await.unwrap();

        let persisted = store.get(EMERGENCY_STATE_KEY).await.unwrap().unwrap();
        assert_eq!(persisted, serde_json::json!("halt"));
    }

    #[tokio::test]
    async fn restore_reads_back_persisted_state() {
        let store = Arc::new(MemoryStateStore::new());
        store
            .set(EMERGENCY_STATE_KEY, serde_json::json!("halt"))
            .await
            .unwrap();

        let controller =
            EmergencyController::new(Arc::new(MemoryEventBus::new()), store, true);
        controller.restore().await;
        assert_eq!(controller.state(), EmergencyState::Halt);
    }
}
