//! One chat turn projected into an event stream.
//!
//! `run_turn` drives the agent loop for a session and turns each loop
//! transition into `TurnEvent`s as it happens. Exactly one terminal event
//! (`Final` or `Error`) closes every turn.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::graph::{Agent, AgentStep};
use super::plan::extract_tasks;
use super::progress::{ProgressUpdate, TaskPlan, TaskStatus};
use super::session::Session;
use crate::ai::types::Message;
use crate::tools::registry::ToolCategory;

/// A tool call as shown to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSummary {
    pub name: String,
    pub args: Value,
}

/// Events streamed to the caller, one JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    TaskPlan {
        tasks: Vec<String>,
    },
    TaskProgress {
        index: usize,
        status: TaskStatus,
        progress: u32,
        completed: usize,
        total: usize,
    },
    ToolCall {
        content: Vec<CallSummary>,
    },
    ToolResult {
        name: String,
        content: String,
    },
    Final {
        content: String,
    },
    Error {
        content: String,
    },
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Final { .. } | TurnEvent::Error { .. })
    }

    /// NDJSON line including the trailing newline
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({"type": "error", "content": format!("Failed to encode event: {e}")}).to_string()
        });
        line.push('\n');
        line
    }
}

impl From<ProgressUpdate> for TurnEvent {
    fn from(update: ProgressUpdate) -> Self {
        TurnEvent::TaskProgress {
            index: update.index,
            status: update.status,
            progress: update.progress,
            completed: update.completed,
            total: update.total,
        }
    }
}

/// Events derived from one loop transition. Updates the plan as a side effect.
pub fn observe_step(plan: &mut TaskPlan, step: AgentStep) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    match step {
        AgentStep::Responded { content, calls } => {
            if plan.is_empty() && !content.trim().is_empty() {
                let tasks = extract_tasks(&content);
                if !tasks.is_empty() {
                    *plan = TaskPlan::new(tasks);
                    events.push(TurnEvent::TaskPlan {
                        tasks: plan.tasks().to_vec(),
                    });
                }
            }

            if !calls.is_empty() {
                events.push(TurnEvent::ToolCall {
                    content: calls
                        .iter()
                        .map(|c| CallSummary {
                            name: c.call.name.clone(),
                            args: c.call.arguments.clone(),
                        })
                        .collect(),
                });
                let first_mutating = calls.iter().find(|c| c.category == ToolCategory::Mutating);
                if let Some(update) = first_mutating.and_then(|c| plan.start(&c.call.id)) {
                    events.push(update.into());
                }
            }
        }
        AgentStep::ToolFinished {
            call_id,
            name,
            content,
            success,
        } => {
            events.push(TurnEvent::ToolResult { name, content });
            if let Some(update) = plan.finish(&call_id, success) {
                events.push(update.into());
            }
        }
    }
    events
}

/// Run one turn for `session` and stream its events into `events`.
///
/// The turn runs to completion even if the receiver is gone. On success the
/// transcript is persisted, trimmed to `max_messages`; on failure the
/// session transcript is left as it was.
pub async fn run_turn(
    agent: &Agent,
    session: &mut Session,
    session_id: &str,
    message: &str,
    max_messages: usize,
    events: &mpsc::Sender<TurnEvent>,
) {
    let mut messages = session.messages.clone();
    messages.push(Message::human(message));

    let (step_tx, mut step_rx) = mpsc::unbounded_channel();
    let plan = &mut session.plan;

    let driver = async {
        let steps = step_tx;
        agent.run(&mut messages, session_id, &steps).await
    };
    let projector = async {
        while let Some(step) = step_rx.recv().await {
            for event in observe_step(plan, step) {
                emit(events, event).await;
            }
        }
    };
    let (result, ()) = tokio::join!(driver, projector);

    match result {
        Ok(()) => {
            let content = messages
                .last()
                .map(|m| m.content().to_string())
                .unwrap_or_default();
            session.commit(messages, max_messages);
            info!(session_id, messages = session.messages.len(), "Turn complete");
            emit(events, TurnEvent::Final { content }).await;
        }
        Err(e) => {
            error!(session_id, "Turn failed: {}", e);
            emit(events, TurnEvent::Error { content: e.to_string() }).await;
        }
    }
}

/// Send unless the caller went away
async fn emit(events: &mpsc::Sender<TurnEvent>, event: TurnEvent) {
    if events.send(event).await.is_err() {
        tracing::debug!("Event receiver dropped, continuing turn");
    }
}
