//! StorePilot Server
//!
//! HTTP front door for the agent: `POST /chat` streams a turn as NDJSON,
//! `GET /healthz` and `GET /health` report liveness.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{http::Method, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use storepilot_core::agent::{Agent, AgentConfig, SessionStore};
use storepilot_core::ai::{ChatModel, OpenAiChatModel, UnavailableModel};
use storepilot_core::exec::{KubeCtl, TokioRunner};
use storepilot_core::mcp::ProvidersConfig;
use storepilot_core::tenant::{CachedDirectory, HttpDirectory, TenantResolver};
use storepilot_core::tools::{McpProviderFactory, ToolCache};
use storepilot_core::RuntimeConfig;

pub mod error;
pub mod routes;
pub mod types;

/// Inventory listings are reused for this long
const DIRECTORY_TTL: Duration = Duration::from_secs(5);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(agent: Agent, sessions: SessionStore) -> Self {
        Self {
            agent: Arc::new(agent),
            sessions: Arc::new(sessions),
        }
    }

    /// Wire the runtime from configuration
    pub async fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let directory = Arc::new(CachedDirectory::new(
            Arc::new(HttpDirectory::new(config.api_base.clone())?),
            DIRECTORY_TTL,
        ));
        let kubectl = Arc::new(KubeCtl::new(config.kube.clone(), Arc::new(TokioRunner)));
        let resolver = Arc::new(TenantResolver::new(directory, kubectl, config.polling.clone()));

        let providers = ProvidersConfig::load(&config.providers_path).await?.providers();
        if providers.is_empty() {
            tracing::warn!(
                path = %config.providers_path.display(),
                "No tool providers configured; the agent will run without tools"
            );
        }
        let factory = Arc::new(McpProviderFactory::new(providers));
        let tools = Arc::new(ToolCache::new(resolver, factory, config.default_store.clone()));

        let model: Arc<dyn ChatModel> = match &config.model {
            Some(settings) => Arc::new(OpenAiChatModel::new(settings.clone())?),
            None => {
                tracing::warn!("Chat model not configured; turns will fail until it is");
                Arc::new(UnavailableModel::new("Missing Azure OpenAI configuration."))
            }
        };

        let agent = Agent::new(model, tools).with_config(AgentConfig {
            max_iterations: config.max_iterations,
            ..AgentConfig::default()
        });
        Ok(Self::new(agent, SessionStore::new(config.session_max_messages)))
    }
}

/// Router with CORS and request tracing
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers([axum::http::HeaderName::from_static(routes::SESSION_HEADER)]);

    routes::api_router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
