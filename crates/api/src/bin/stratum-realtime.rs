//! `stratum-realtime` — the standalone WebSocket fan-out process (C10).
//!
//! Brings up the infrastructure assembly (C7) and serves the fan-out
//! server until `SIGINT`/`SIGTERM` (§6 "Exit codes": `0` graceful, `1`
//! configuration error, `2` infrastructure initialization failure).

use std::process::ExitCode;
use std::sync::Arc;

use stratum_config::{Environment, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    let environment: Environment = std::env::var("STRATUM_ENV")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(Environment::Development);

    let settings = match Settings::load(environment) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(1);
        }
    };

    let infra = match stratum_infra::Infra::initialize(settings.clone()).await {
        Ok(infra) => Arc::new(infra),
        Err(err) => {
            eprintln!("infrastructure initialization failed: {err}");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = stratum_api::run(infra.clone(), settings).await {
        eprintln!("server error: {err}");
        return ExitCode::from(2);
    }

    infra.shutdown().await;
    ExitCode::SUCCESS
}
