//! OpenAI-compatible chat/completions client (non-streaming)
//!
//! Works against Azure OpenAI deployments exposed through the OpenAI-style
//! endpoint as well as plain OpenAI-compatible servers.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::client::ChatModel;
use super::types::{AiTool, Message, ToolCall};

/// Connection settings for the model endpoint
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// Base URL; `/chat/completions` is appended
    pub endpoint: String,
    pub api_key: String,
    /// Model or deployment name
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiSettings {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: 1.0,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Chat model backed by an OpenAI-compatible HTTP endpoint
pub struct OpenAiChatModel {
    http: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiChatModel {
    pub fn new(settings: OpenAiSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, settings })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.settings.endpoint)
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn invoke(&self, messages: &[Message], tools: &[AiTool]) -> Result<Message> {
        let body = build_request_body(&self.settings.model, self.settings.temperature, messages, tools);
        debug!(
            model = %self.settings.model,
            messages = messages.len(),
            tools = tools.len(),
            "Invoking chat model"
        );

        let response = self
            .http
            .post(self.url())
            .bearer_auth(&self.settings.api_key)
            .header("api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .context("Chat model request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Chat model returned {}: {}", status, text));
        }

        let json: Value = response.json().await.context("Chat model returned malformed JSON")?;
        parse_response(&json)
    }
}

/// Convert conversation messages to chat/completions messages
pub fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match msg {
            Message::System { content } => json!({"role": "system", "content": content}),
            Message::Human { content } => json!({"role": "user", "content": content}),
            Message::Ai { content, tool_calls } if tool_calls.is_empty() => {
                json!({"role": "assistant", "content": content})
            }
            Message::Ai { content, tool_calls } => {
                let calls: Vec<Value> = tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string()
                            }
                        })
                    })
                    .collect();
                let mut obj = json!({"role": "assistant", "tool_calls": calls});
                if !content.is_empty() {
                    obj["content"] = json!(content);
                }
                obj
            }
            Message::Tool {
                tool_call_id,
                content,
                ..
            } => json!({"role": "tool", "tool_call_id": tool_call_id, "content": content}),
        })
        .collect()
}

/// Convert tool descriptors to chat/completions function tools
pub fn convert_tools(tools: &[AiTool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema
                }
            })
        })
        .collect()
}

fn build_request_body(model: &str, temperature: f32, messages: &[Message], tools: &[AiTool]) -> Value {
    let mut body = json!({
        "model": model,
        "messages": convert_messages(messages),
        "temperature": temperature,
    });
    if !tools.is_empty() {
        body["tools"] = json!(convert_tools(tools));
    }
    body
}

/// Extract the assistant message from a chat/completions response
pub fn parse_response(json: &Value) -> Result<Message> {
    let message = json
        .pointer("/choices/0/message")
        .ok_or_else(|| anyhow!("Chat model response has no choices"))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tool_calls: Vec<ToolCall> = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| calls.iter().enumerate().filter_map(|(i, c)| parse_tool_call(i, c)).collect())
        .unwrap_or_default();

    Ok(Message::Ai { content, tool_calls })
}

fn parse_tool_call(index: usize, call: &Value) -> Option<ToolCall> {
    let function = call.get("function")?;
    let name = function.get("name")?.as_str()?.to_string();
    let id = call
        .get("id")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| format!("call_{}", index));
    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!(tool = %name, "Tool call arguments are not valid JSON: {}", e);
            json!({})
        }),
        Some(other) => other.clone(),
        None => json!({}),
    };
    Some(ToolCall { id, name, arguments })
}
