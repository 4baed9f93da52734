//! Integration tests for the WebSocket fan-out server: HTTP introspection
//! via `tower::ServiceExt::oneshot`, and the live WebSocket protocol via a
//! real bound listener and a `tokio-tungstenite` client (§8 property 8,
//! scenario S6).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tower::ServiceExt;

use stratum_config::{Environment, Settings};
use stratum_core::{EventEnvelope, ExecutionId, WorkflowEventType, WorkflowId};
use stratum_infra::Infra;

async fn test_infra(settings: Settings) -> Arc<Infra> {
    Arc::new(Infra::initialize(settings).await.unwrap())
}

fn settings_without_auth() -> Settings {
    let mut settings = Settings::defaults(Environment::Development);
    settings.ws_port = 0;
    settings.require_auth = false;
    settings.recent_events_capacity = 50;
    settings
}

fn workflow_event(workflow_id: &str, n: u32) -> EventEnvelope {
    let workflow_id = WorkflowId::new(workflow_id);
    EventEnvelope::new(
        WorkflowEventType::NodeCompleted,
        ExecutionId::new(&workflow_id),
        workflow_id,
        None,
        None,
        chrono::Utc::now(),
        json!({ "sequence": n }),
    )
}

#[tokio::test]
async fn status_endpoint_reports_ok() {
    let settings = settings_without_auth();
    let infra = test_infra(settings.clone()).await;
    let server = stratum_api::build_router(infra, &settings).await.unwrap();

    let response = server
        .router
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["server"], "stratum-realtime");
}

#[tokio::test]
async fn health_endpoint_is_200_with_memory_backends() {
    let settings = settings_without_auth();
    let infra = test_infra(settings.clone()).await;
    let server = stratum_api::build_router(infra, &settings).await.unwrap();

    let response = server
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["infrastructure"]["emergency"], "normal");
}

#[tokio::test]
async fn metrics_endpoint_reports_json_counters() {
    let settings = settings_without_auth();
    let infra = test_infra(settings.clone()).await;
    let server = stratum_api::build_router(infra, &settings).await.unwrap();

    let response = server
        .router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["current_clients"], 0);
    assert_eq!(json["recent_buffer_size"], 0);
}

#[tokio::test]
async fn metrics_prometheus_endpoint_is_additive() {
    let settings = settings_without_auth();
    let infra = test_infra(settings.clone()).await;
    let server = stratum_api::build_router(infra, &settings).await.unwrap();

    let response = server
        .router
        .oneshot(
            Request::get("/metrics/prometheus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("stratum_ws_current_clients 0"));
}

/// S6: publish 5 events for workflow W while no client is connected, then
/// connect and subscribe — the client must see `subscribed`, then
/// `recent_events` with exactly those 5 events in publication order, then
/// any later live event.
#[tokio::test]
async fn replay_then_live_matches_scenario_s6() {
    let settings = settings_without_auth();
    let infra = test_infra(settings.clone()).await;

    for n in 0..5 {
        infra
            .events
            .publish(
                &EventEnvelope::channel_for(&WorkflowId::new("arb_btc")),
                workflow_event("arb_btc", n),
            )
            .await
            .unwrap();
    }
    // Give the bus's per-subscriber delivery task a beat to drain into the
    // replay buffer before a client connects.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let server = stratum_api::build_router(infra.clone(), &settings)
        .await
        .unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server.router).await.unwrap();
    });

    let url = format!("ws://{addr}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    let connected = next_json(&mut ws).await;
    assert_eq!(connected["type"], "connected");

    ws.send(tokio_tungstenite::tungstenite::Message::Text(
        json!({"type": "subscribe_workflow", "workflow_id": "arb_btc"}).to_string(),
    ))
    .await
    .unwrap();

    let subscribed = next_json(&mut ws).await;
    assert_eq!(subscribed["type"], "subscribed");
    assert_eq!(subscribed["id"], "arb_btc");

    let recent = next_json(&mut ws).await;
    assert_eq!(recent["type"], "recent_events");
    assert_eq!(recent["count"], 5);
    let sequences: Vec<u64> = recent["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["payload"]["sequence"].as_u64().unwrap())
        .collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);

    infra
        .events
        .publish(
            &EventEnvelope::channel_for(&WorkflowId::new("arb_btc")),
            workflow_event("arb_btc", 5),
        )
        .await
        .unwrap();

    let live = next_json(&mut ws).await;
    assert_eq!(live["type"], "workflow_event");
    assert_eq!(live["payload"]["payload"]["sequence"], 5);
}

#[tokio::test]
async fn unknown_message_type_replies_error_without_disconnecting() {
    let settings = settings_without_auth();
    let infra = test_infra(settings.clone()).await;
    let server = stratum_api::build_router(infra, &settings).await.unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server.router).await.unwrap();
    });

    let url = format!("ws://{addr}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let _connected = next_json(&mut ws).await;

    ws.send(tokio_tungstenite::tungstenite::Message::Text(
        json!({"type": "not_a_real_message"}).to_string(),
    ))
    .await
    .unwrap();
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");

    // Still connected: a subsequent well-formed message is served.
    ws.send(tokio_tungstenite::tungstenite::Message::Text(
        json!({"type": "subscribe_bot", "bot_id": "bot_1"}).to_string(),
    ))
    .await
    .unwrap();
    let subscribed = next_json(&mut ws).await;
    assert_eq!(subscribed["type"], "subscribed");
}

async fn next_json(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            tokio_tungstenite::tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).unwrap();
            }
            tokio_tungstenite::tungstenite::Message::Ping(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
