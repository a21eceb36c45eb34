//! Chat endpoint streaming turn events as NDJSON.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::post,
    Json, Router,
};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use uuid::Uuid;

use storepilot_core::agent::{run_turn, TurnEvent};

use crate::error::AppError;
use crate::types::ChatRequest;
use crate::AppState;

const MIN_MESSAGE_CHARS: usize = 3;
const EVENT_CHANNEL_BUFFER: usize = 256;
const NDJSON: &str = "application/x-ndjson";
const TURN_ABORTED: &str = "The turn stopped unexpectedly. Please try again.";
pub const SESSION_HEADER: &str = "x-session-id";

pub fn router() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Result<Response, AppError> {
    let message = req.message.trim().to_string();
    if message.chars().count() < MIN_MESSAGE_CHARS {
        return Err(AppError::BadRequest(format!(
            "message must be at least {MIN_MESSAGE_CHARS} characters"
        )));
    }

    let session_id = req
        .session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let header_value = HeaderValue::from_str(&session_id)
        .map_err(|_| AppError::BadRequest("session_id is not a valid header value".to_string()))?;

    let mut session = state.sessions.acquire(&session_id).await?;
    tracing::info!(session_id = %session_id, "Chat turn started");

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
    let agent = Arc::clone(&state.agent);
    let max_messages = state.sessions.max_messages();
    let turn_tx = tx.clone();
    spawn_turn(
        async move {
            run_turn(&agent, &mut session, &session_id, &message, max_messages, &turn_tx).await;
        },
        tx,
    );

    let stream = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(Bytes::from(event.to_ndjson())));

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(NDJSON));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(SESSION_HEADER, header_value);
    Ok(response)
}

/// Run a turn on its own task. If the turn panics, the stream still ends
/// with an `error` event.
fn spawn_turn<F>(turn: F, events: mpsc::Sender<TurnEvent>)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = tokio::spawn(turn).await {
            tracing::error!(error = %e, "Chat turn aborted");
            let _ = events
                .send(TurnEvent::Error {
                    content: TURN_ABORTED.to_string(),
                })
                .await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_panicking_turn_ends_with_error() {
        let (tx, rx) = mpsc::channel(8);
        let turn_tx = tx.clone();
        spawn_turn(
            async move {
                let _held = turn_tx;
                panic!("tool blew up");
            },
            tx,
        );

        let events = drain(rx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TurnEvent::Error { content } if content == TURN_ABORTED));
    }

    #[tokio::test]
    async fn test_completed_turn_adds_nothing() {
        let (tx, rx) = mpsc::channel(8);
        let turn_tx = tx.clone();
        spawn_turn(
            async move {
                let _ = turn_tx
                    .send(TurnEvent::Final {
                        content: "done".to_string(),
                    })
                    .await;
            },
            tx,
        );

        let events = drain(rx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TurnEvent::Final { content } if content == "done"));
    }
}
