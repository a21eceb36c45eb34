//! Chat model abstraction and the OpenAI-compatible client

pub mod client;
pub mod openai;
pub mod types;

pub use client::{ChatModel, UnavailableModel};
pub use openai::{OpenAiChatModel, OpenAiSettings};
pub use types::{AiTool, Message, ToolCall};
