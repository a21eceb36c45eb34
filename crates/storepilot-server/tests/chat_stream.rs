//! End-to-end checks of the HTTP surface with in-process fakes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use storepilot_core::agent::{Agent, SessionStore};
use storepilot_core::ai::{AiTool, ChatModel, Message, UnavailableModel};
use storepilot_core::exec::{CommandRunner, KubeConfig, KubeCtl, RunOutcome};
use storepilot_core::mcp::ToolProvider;
use storepilot_core::tenant::{StoreRecord, TenantDirectory, TenantResolver, TenantTarget, WorkerPolling};
use storepilot_core::tools::{ProviderFactory, ToolCache};
use storepilot_server::{build_router, AppState};

struct EmptyDirectory;

#[async_trait]
impl TenantDirectory for EmptyDirectory {
    async fn list_stores(&self) -> Option<Vec<StoreRecord>> {
        Some(Vec::new())
    }
}

struct NoRunner;

#[async_trait]
impl CommandRunner for NoRunner {
    async fn run(
        &self,
        _program: &str,
        _args: &[String],
        _env: &HashMap<String, String>,
        _timeout: Duration,
    ) -> std::io::Result<RunOutcome> {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no kubectl in tests"))
    }
}

struct NoProviders;

impl ProviderFactory for NoProviders {
    fn providers_for(&self, _target: &TenantTarget) -> Vec<Arc<dyn ToolProvider>> {
        Vec::new()
    }
}

struct EchoModel;

#[async_trait]
impl ChatModel for EchoModel {
    async fn invoke(&self, messages: &[Message], _tools: &[AiTool]) -> Result<Message> {
        let last = messages.last().map(|m| m.content().to_string()).unwrap_or_default();
        Ok(Message::ai(format!("You said: {last}")))
    }
}

fn tool_cache() -> Arc<ToolCache> {
    let kubectl = Arc::new(KubeCtl::new(KubeConfig::default(), Arc::new(NoRunner)));
    let resolver = Arc::new(TenantResolver::new(
        Arc::new(EmptyDirectory),
        kubectl,
        WorkerPolling::default(),
    ));
    Arc::new(ToolCache::new(resolver, Arc::new(NoProviders), None))
}

fn state_with(model: Arc<dyn ChatModel>) -> AppState {
    AppState::new(Agent::new(model, tool_cache()), SessionStore::default())
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn ndjson_events(body: Body) -> Vec<Value> {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_chat_streams_final_event() {
    let app = build_router(state_with(Arc::new(EchoModel)));

    let response = app
        .oneshot(chat_request(json!({"message": "list my stores", "session_id": "s-1"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-ndjson"
    );
    assert_eq!(response.headers().get("x-session-id").unwrap(), "s-1");

    let events = ndjson_events(response.into_body()).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "final");
    assert_eq!(events[0]["content"], "You said: list my stores");
}

#[tokio::test]
async fn test_chat_assigns_session_id() {
    let app = build_router(state_with(Arc::new(EchoModel)));

    let response = app
        .oneshot(chat_request(json!({"message": "hello there"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let id = response.headers().get("x-session-id").unwrap().to_str().unwrap();
    assert_eq!(id.len(), 36);
}

#[tokio::test]
async fn test_chat_accepts_camel_case_session_id() {
    let state = state_with(Arc::new(EchoModel));
    let app = build_router(state.clone());

    let response = app
        .oneshot(chat_request(json!({"message": "hello there", "sessionId": "camel"})))
        .await
        .unwrap();

    assert_eq!(response.headers().get("x-session-id").unwrap(), "camel");
    let _ = ndjson_events(response.into_body()).await;
    assert!(state.sessions.contains("camel").await);
}

#[tokio::test]
async fn test_model_failure_streams_single_error() {
    let model = Arc::new(UnavailableModel::new("Missing Azure OpenAI configuration."));
    let app = build_router(state_with(model));

    let response = app
        .oneshot(chat_request(json!({"message": "create a store"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let events = ndjson_events(response.into_body()).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
    assert!(events[0]["content"]
        .as_str()
        .unwrap()
        .contains("Missing Azure OpenAI configuration."));
}

#[tokio::test]
async fn test_short_message_rejected() {
    let app = build_router(state_with(Arc::new(EchoModel)));

    let response = app
        .oneshot(chat_request(json!({"message": "  hi  "})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_busy_session_conflicts() {
    let state = state_with(Arc::new(EchoModel));
    let _held = state.sessions.acquire("busy").await.unwrap();
    let app = build_router(state.clone());

    let response = app
        .oneshot(chat_request(json!({"message": "hello there", "session_id": "busy"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_health_endpoints() {
    let state = state_with(Arc::new(EchoModel));

    for path in ["/healthz", "/health"] {
        let response = build_router(state.clone())
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }
}
