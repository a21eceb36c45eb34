//! The agent loop: a three-state machine.
//!
//! ```text
//!   ┌────────┐  tool calls   ┌────────┐
//!   │ Agent  │ ────────────► │ Tools  │
//!   │        │ ◄──────────── │        │
//!   └────────┘    always     └────────┘
//!       │ no tool calls
//!       ▼
//!     End
//! ```
//!
//! Every transition is published as an `AgentStep` so callers can project
//! the run into an event stream while it happens.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::context;
use crate::ai::client::ChatModel;
use crate::ai::types::{Message, ToolCall};
use crate::tools::cache::ToolCache;
use crate::tools::registry::{ToolCategory, ToolContext, ToolRegistry, ToolResult, DEFAULT_TOOL_TIMEOUT};

/// Agent visits allowed per turn
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Pause after a tools visit
pub const DEFAULT_TOOL_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Agent,
    Tools,
    End,
}

/// A tool call as requested by the model, with its category
#[derive(Debug, Clone)]
pub struct PlannedCall {
    pub call: ToolCall,
    pub category: ToolCategory,
}

/// Observable transition of the loop
#[derive(Debug, Clone)]
pub enum AgentStep {
    /// The model answered; `calls` is empty when the turn is about to end
    Responded {
        content: String,
        calls: Vec<PlannedCall>,
    },
    /// One requested tool finished and its result was appended
    ToolFinished {
        call_id: String,
        name: String,
        content: String,
        success: bool,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{0}")]
    Model(String),
    #[error("Agent stopped after {0} steps without a final answer")]
    StepLimit(usize),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub tool_pause: Duration,
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_pause: DEFAULT_TOOL_PAUSE,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// Model plus tool source; shared by every session
pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolCache>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolCache>) -> Self {
        Self {
            model,
            tools,
            config: AgentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tools(&self) -> &Arc<ToolCache> {
        &self.tools
    }

    /// Run until the model stops requesting tools.
    ///
    /// `messages` is updated in place; on error it holds everything appended
    /// before the failure.
    pub async fn run(
        &self,
        messages: &mut Vec<Message>,
        session_id: &str,
        steps: &mpsc::UnboundedSender<AgentStep>,
    ) -> Result<(), AgentError> {
        let mut state = AgentState::Agent;
        let mut visits = 0usize;
        let mut registry = ToolRegistry::new();
        let mut focus: Option<String> = None;

        loop {
            state = match state {
                AgentState::Agent => {
                    visits += 1;
                    if visits > self.config.max_iterations {
                        warn!(session_id, visits, "Step limit reached");
                        return Err(AgentError::StepLimit(self.config.max_iterations));
                    }

                    let system = context::system_context(self.tools.resolver().directory().as_ref()).await;
                    context::inject_context(messages, system);

                    focus = context::infer_focus(messages);
                    let bound = self.tools.get_tools(focus.as_deref()).await;
                    registry = ToolRegistry::from_tools(&bound).with_timeout(self.config.tool_timeout);
                    debug!(
                        session_id,
                        focus = ?focus,
                        tools = registry.len(),
                        "Invoking model"
                    );

                    let input = context::model_input(messages, focus.as_deref());
                    let response = self
                        .model
                        .invoke(&input, &registry.ai_tools())
                        .await
                        .map_err(|e| AgentError::Model(format!("{e:#}")))?;
                    let response = into_ai_message(response);

                    let calls: Vec<PlannedCall> = response
                        .tool_calls()
                        .iter()
                        .map(|call| PlannedCall {
                            call: call.clone(),
                            category: registry.category(&call.name),
                        })
                        .collect();
                    let next = if calls.is_empty() {
                        AgentState::End
                    } else {
                        AgentState::Tools
                    };

                    let _ = steps.send(AgentStep::Responded {
                        content: response.content().to_string(),
                        calls,
                    });
                    messages.push(response);
                    next
                }
                AgentState::Tools => {
                    let calls = messages
                        .last()
                        .map(|m| m.tool_calls().to_vec())
                        .unwrap_or_default();
                    let ctx = ToolContext {
                        tenant: focus.clone(),
                        ..ToolContext::for_session(session_id)
                    };

                    for call in calls {
                        let result = match registry.execute(&call.name, call.arguments.clone(), &ctx).await {
                            Some(result) => result,
                            None => {
                                warn!(session_id, tool = %call.name, "Model requested an unbound tool");
                                ToolResult::error_with_code("unknown_tool", format!("Unknown tool: {}", call.name))
                            }
                        };
                        let success = result.signals_success();

                        messages.push(Message::Tool {
                            tool_call_id: call.id.clone(),
                            name: call.name.clone(),
                            content: result.output.clone(),
                        });
                        let _ = steps.send(AgentStep::ToolFinished {
                            call_id: call.id,
                            name: call.name,
                            content: result.output,
                            success,
                        });
                    }

                    tokio::time::sleep(self.config.tool_pause).await;
                    AgentState::Agent
                }
                AgentState::End => {
                    info!(session_id, visits, "Agent finished");
                    return Ok(());
                }
            };
        }
    }
}

/// Models are expected to answer with an AI message; anything else is
/// treated as a plain answer.
fn into_ai_message(message: Message) -> Message {
    match message {
        Message::Ai { .. } => message,
        other => Message::ai(other.content()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::ai::types::AiTool;

    /// Chat model answering from a fixed script and recording its inputs
    pub(crate) struct ScriptedModel {
        replies: Mutex<VecDeque<anyhow::Result<Message>>>,
        seen: Mutex<Vec<(Vec<Message>, Vec<AiTool>)>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(replies: Vec<anyhow::Result<Message>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<(Vec<Message>, Vec<AiTool>)> {
            self.seen.lock().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn invoke(&self, messages: &[Message], tools: &[AiTool]) -> anyhow::Result<Message> {
            self.seen.lock().push((messages.to_vec(), tools.to_vec()));
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(Message::ai("(script exhausted)")))
        }
    }

    pub(crate) fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Message {
        Message::Ai {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }],
        }
    }
}
