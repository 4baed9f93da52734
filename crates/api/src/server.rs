//! Router assembly and the server's run loop with graceful shutdown
//! (§4.10, SPEC_FULL "Graceful shutdown").

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::fanout;
use crate::http;
use crate::state::ApiState;
use crate::ws;
use stratum_config::Settings;
use stratum_infra::Infra;

/// The assembled fan-out server: its router plus the state it was built
/// against, so callers (tests, the binary entry point) can serve it
/// however they like — a real listener, or `tower::ServiceExt::oneshot`.
pub struct Server {
    pub router: Router,
    pub state: Arc<ApiState>,
}

/// Build the router (§4.10's three endpoints plus the Prometheus
/// supplement and the WebSocket upgrade) and install the standing
/// event-bus subscriptions (§1). Does not bind a socket.
pub async fn build_router(infra: Arc<Infra>, settings: &Settings) -> Result<Server, ApiError> {
    let state = Arc::new(ApiState::new(infra, settings));
    fanout::install(state.clone()).await?;

    let router = Router::new()
        .route("/status", get(http::status))
        .route("/health", get(http::health))
        .route("/metrics", get(http::metrics))
        .route("/metrics/prometheus", get(http::metrics_prometheus))
        .route("/ws", get(ws::ws_handler))
        .layer(cors_layer(&settings.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    Ok(Server { router, state })
}

/// `*` in development, an explicit origin allow-list in production (§6
/// "HTTP surface").
fn cors_layer(allowed: &[String]) -> CorsLayer {
    if allowed.iter().any(|origin| origin == "*") {
        CorsLayer::permissive()
    } else {
        let origins = allowed
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }
}

/// Bind and serve until `SIGINT`/`SIGTERM`, then drain every connected
/// session with a close frame before returning (SPEC_FULL "Graceful
/// shutdown").
pub async fn run(infra: Arc<Infra>, settings: Settings) -> Result<(), ApiError> {
    let addr: SocketAddr = format!("{}:{}", settings.ws_host, settings.ws_port)
        .parse()
        .map_err(|_| {
            ApiError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid ws_host/ws_port",
            ))
        })?;

    let server = build_router(infra, &settings).await?;
    let shutdown = server.state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "stratum-realtime listening");

    axum::serve(listener, server.router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received, draining sessions");
            let _ = shutdown.send(());
        })
        .await?;

    tracing::info!("stratum-realtime shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
