//! The WebSocket endpoint: connection lifecycle, authentication,
//! subscription management, and replay (§4.10).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{Filter, Session};
use crate::state::ApiState;

/// Bound on a session's outbound queue; a session that cannot keep up has
/// messages dropped rather than blocking the fan-out loop (§5 "WebSocket
/// sessions").
const SESSION_QUEUE_CAPACITY: usize = 256;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(SESSION_QUEUE_CAPACITY);
    let mut writer_shutdown = state.shutdown.subscribe();
    let mut reader_shutdown = state.shutdown.subscribe();

    let sid = Uuid::new_v4();
    let authenticated = !state.require_auth;
    let session = Arc::new(Session::new(sid, tx, authenticated));
    state.sessions.insert(sid, session.clone());
    state.metrics.client_connected();

    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(message) => {
                        if let Ok(text) = serde_json::to_string(&message) {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                },
                _ = writer_shutdown.recv() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    session.notify(ServerMessage::Connected {
        sid: sid.to_string(),
        auth_required: state.require_auth,
        server_time: chrono::Utc::now(),
    });

    loop {
        tokio::select! {
            received = stream.next() => {
                match received {
                    Some(Ok(Message::Text(text))) => {
                        if handle_text_frame(&state, &session, &text).is_break() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            _ = reader_shutdown.recv() => break,
        }
    }

    writer.abort();
    state.sessions.remove(&sid);
}

enum Flow {
    Continue,
    Break,
}

impl Flow {
    fn is_break(&self) -> bool {
        matches!(self, Self::Break)
    }
}

/// §7 "WebSocket protocol errors": malformed JSON disconnects; an unknown
/// message type replies `error` and keeps the connection open.
fn handle_text_frame(state: &Arc<ApiState>, session: &Arc<Session>, text: &str) -> Flow {
    let parsed: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            session.notify(ServerMessage::Error {
                message: "malformed JSON frame".to_string(),
            });
            return Flow::Break;
        }
    };

    let message: ClientMessage = match serde_json::from_value(parsed) {
        Ok(message) => message,
        Err(_) => {
            session.notify(ServerMessage::Error {
                message: "unknown message type".to_string(),
            });
            return Flow::Continue;
        }
    };

    dispatch_client_message(state, session, message);
    Flow::Continue
}

fn dispatch_client_message(state: &Arc<ApiState>, session: &Arc<Session>, message: ClientMessage) {
    match message {
        ClientMessage::Authenticate { token } => {
            let success =
                !state.require_auth || state.auth_token.as_deref() == Some(token.as_str());
            session.set_authenticated(success);
            session.notify(ServerMessage::AuthResponse {
                success,
                message: if success {
                    "authenticated".to_string()
                } else {
                    "invalid token".to_string()
                },
            });
        }
        ClientMessage::SubscribeWorkflow { workflow_id } => {
            subscribe(state, session, Filter::Workflow(workflow_id));
        }
        ClientMessage::SubscribeBot { bot_id } => {
            subscribe(state, session, Filter::Bot(bot_id));
        }
        ClientMessage::SubscribeStrategy { strategy_id } => {
            subscribe(state, session, Filter::Strategy(strategy_id));
        }
        ClientMessage::Unsubscribe { filter, id } => {
            session.unsubscribe(Filter::new(filter, id));
        }
    }
}

fn subscribe(state: &Arc<ApiState>, session: &Arc<Session>, filter: Filter) {
    if state.require_auth && !session.is_authenticated() {
        session.notify(ServerMessage::Error {
            message: "authentication required before subscribing".to_string(),
        });
        return;
    }
    session.subscribe(filter, &state.replay);
    state.metrics.subscribed();
}
