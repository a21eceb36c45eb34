//! Tool bridge over the MCP stdio protocol
//!
//! Providers are external processes listing and executing tools over
//! newline-delimited JSON-RPC. The bridge keeps one persistent connection
//! per provider per tenant and wraps each listed tool as a `Tool`.

pub mod bridge;
pub mod client;
pub mod config;
pub mod protocol;
pub mod schema;
pub mod tool;
pub mod transport;

pub use bridge::{discover, qualified_tool_name, ProviderBridge, ToolProvider, DEFAULT_IDLE_TIMEOUT};
pub use client::McpClient;
pub use config::{ProviderSpec, ProvidersConfig};
pub use protocol::{McpContent, McpToolDef, McpToolResult, ToolAnnotations};
pub use schema::{ArgKind, ArgSchema, ArgSpec, SchemaError};
pub use tool::BridgedTool;
