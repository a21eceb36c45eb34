//! Tools exposed to the agent
//!
//! `registry` holds the per-visit lookup table, `cache` the per-tenant
//! discovered tool sets.

pub mod cache;
pub mod registry;
#[cfg(test)]
pub(crate) mod testing;

pub use cache::{McpProviderFactory, ProviderFactory, ToolCache};
pub use registry::{
    tool_category, Tool, ToolCategory, ToolContext, ToolRegistry, ToolResult, DEFAULT_TOOL_TIMEOUT,
};
