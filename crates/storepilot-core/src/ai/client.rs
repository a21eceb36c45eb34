//! Chat model seam

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::types::{AiTool, Message};

/// A chat model: message list plus callable tools in, one AI message out.
///
/// The returned message is expected to be `Message::Ai`; it either carries
/// tool calls or is the final answer.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, messages: &[Message], tools: &[AiTool]) -> Result<Message>;
}

/// Stand-in used when no model is configured; every call fails with the reason
pub struct UnavailableModel {
    reason: String,
}

impl UnavailableModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ChatModel for UnavailableModel {
    async fn invoke(&self, _messages: &[Message], _tools: &[AiTool]) -> Result<Message> {
        Err(anyhow!("{}", self.reason))
    }
}
