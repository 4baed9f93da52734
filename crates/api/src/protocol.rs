//! Wire types for the WebSocket edge (§6 "WebSocket wire format").
//!
//! One JSON object per text frame, discriminated by a `type` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratum_core::EventEnvelope;

/// Which filter kind a `subscribe_*`/`unsubscribe` message names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Workflow,
    Bot,
    Strategy,
}

/// A message a client sends (§6).
///
/// `unsubscribe{type, id}` as spec'd can't reuse the outer `type` key that
/// already discriminates this enum, so the inner filter kind rides a
/// `filter` field instead: `{"type": "unsubscribe", "filter": "workflow",
/// "id": "arb_btc"}` (documented in DESIGN.md as a deliberate wire-format
/// resolution, not a deviation from §6's meaning).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Authenticate { token: String },
    SubscribeWorkflow { workflow_id: String },
    SubscribeBot { bot_id: String },
    SubscribeStrategy { strategy_id: String },
    Unsubscribe { filter: FilterKind, id: String },
}

/// A message the server sends (§6).
#[derive(Debug, Clone, Serialize)]
#[allow(clippy::large_enum_variant)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        sid: String,
        auth_required: bool,
        server_time: DateTime<Utc>,
    },
    AuthResponse {
        success: bool,
        message: String,
    },
    Subscribed {
        filter: FilterKind,
        id: String,
    },
    Unsubscribed {
        filter: FilterKind,
        id: String,
    },
    RecentEvents {
        events: Vec<EventEnvelope>,
        count: usize,
    },
    WorkflowEvent {
        payload: EventEnvelope,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_workflow_deserializes() {
        let raw = r#"{"type": "subscribe_workflow", "workflow_id": "arb_btc"}"#;
        let message: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(message, ClientMessage::SubscribeWorkflow { workflow_id } if workflow_id == "arb_btc"));
    }

    #[test]
    fn unsubscribe_deserializes_with_filter_field() {
        let raw = r#"{"type": "unsubscribe", "filter": "bot", "id": "bot_1"}"#;
        let message: ClientMessage = serde_json::from_str(raw).unwrap();
        match message {
            ClientMessage::Unsubscribe { filter, id } => {
                assert_eq!(filter, FilterKind::Bot);
                assert_eq!(id, "bot_1");
            }
            other => panic!("expected Unsubscribe, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_fails_to_deserialize() {
        let raw = r#"{"type": "not_a_real_message"}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn connected_serializes_with_tag() {
        let message = ServerMessage::Connected {
            sid: "s1".to_string(),
            auth_required: true,
            server_time: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["sid"], "s1");
        assert_eq!(json["auth_required"], true);
    }
}
