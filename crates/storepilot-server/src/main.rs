//! StorePilot Server
//!
//! Streams agent turns over HTTP and keeps per-tenant tool providers warm.

use std::net::SocketAddr;
use std::time::Duration;

use storepilot_core::RuntimeConfig;
use storepilot_server::{build_router, AppState};

const DEFAULT_PORT: &str = "8000";
const REAP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = RuntimeConfig::from_env();
    let state = AppState::from_config(&config).await?;

    let tools = state.agent.tools().clone();
    let idle = config.provider_idle_timeout;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAP_INTERVAL);
        loop {
            ticker.tick().await;
            tools.reap_idle(idle).await;
        }
    });

    let app = build_router(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    tracing::info!("Starting storepilot-server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
