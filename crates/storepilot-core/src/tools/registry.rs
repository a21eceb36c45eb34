//! Tool registry for the tools bound to one agent visit
//!
//! Tools are looked up by qualified name and executed with a timeout.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ai::types::AiTool;

/// Default tool execution timeout (2 minutes)
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Verbs that make a tool name count as a write
const WRITE_VERBS: &[&str] = &[
    "create", "update", "delete", "send", "import", "set", "flush", "activate",
];

/// Tool category for progress tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    /// Never changes tenant state
    ReadOnly,
    /// Changes tenant state; advances the task plan
    Mutating,
}

/// Categorize a tool by name.
///
/// The lower-cased name is split on `_`; it is mutating if any token is a
/// write verb or the last token starts with one (`woo_flush_cache`,
/// `popup_activate`, `banner_updates`).
pub fn tool_category(name: &str) -> ToolCategory {
    let lower = name.to_lowercase();
    let tokens: Vec<&str> = lower.split('_').filter(|t| !t.is_empty()).collect();
    let verb_token = tokens.iter().any(|t| WRITE_VERBS.contains(t));
    let verb_suffix = tokens
        .last()
        .is_some_and(|last| WRITE_VERBS.iter().any(|v| last.starts_with(v)));
    if verb_token || verb_suffix {
        ToolCategory::Mutating
    } else {
        ToolCategory::ReadOnly
    }
}

/// Tool execution result
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a success result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create a structured `{"ok": false, "error": {code, message}}` result.
    pub fn error_with_code(code: &str, msg: impl std::fmt::Display) -> Self {
        Self {
            output: serde_json::json!({
                "ok": false,
                "error": {"code": code, "message": msg.to_string()}
            })
            .to_string(),
            is_error: true,
        }
    }

    /// Create an invalid-parameters error.
    pub fn invalid_parameters(msg: impl std::fmt::Display) -> Self {
        Self::error_with_code("invalid_parameters", msg)
    }

    /// Create an error result, classifying the code from the message
    pub fn error(msg: impl std::fmt::Display) -> Self {
        let message = msg.to_string();
        let code = classify_error_code(&message);
        Self::error_with_code(code, message)
    }

    /// Whether the result signals success to the task tracker.
    ///
    /// Not flagged as an error, and either a JSON object whose `ok` is not
    /// `false`, or plain text not starting with `Error:`.
    pub fn signals_success(&self) -> bool {
        if self.is_error {
            return false;
        }
        match serde_json::from_str::<Value>(&self.output) {
            Ok(Value::Object(map)) => map.get("ok") != Some(&Value::Bool(false)),
            Ok(_) => true,
            Err(_) => !self.output.trim_start().starts_with("Error:"),
        }
    }
}

fn classify_error_code(message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    if lower.contains("invalid parameters")
        || lower.contains("missing required field")
        || lower.contains("must be")
    {
        "invalid_parameters"
    } else if lower.contains("not allowed by policy") {
        "policy_denied"
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "timeout"
    } else if lower.contains("not found") {
        "not_found"
    } else if lower.contains("unknown tool") {
        "unknown_tool"
    } else {
        "tool_error"
    }
}

/// Context for tool execution
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: Option<String>,
    /// Tenant the tools were bound for, if one was inferred
    pub tenant: Option<String>,
}

impl ToolContext {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }
}

/// Trait for tool implementations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Qualified tool name
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Whether calls change tenant state. Defaults to the name heuristic.
    fn category(&self) -> ToolCategory {
        tool_category(self.name())
    }

    /// Execute the tool
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult;
}

/// Lookup table for the tools bound to one model invocation
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Default timeout for tool execution
    default_timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Build from a tool list; later duplicates win
    pub fn from_tools(tools: &[Arc<dyn Tool>]) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(Arc::clone(tool));
        }
        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Duplicate tool name, keeping the later one");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get all tools as model tool descriptors, sorted by name
    pub fn ai_tools(&self) -> Vec<AiTool> {
        let mut tools: Vec<AiTool> = self
            .tools
            .values()
            .map(|t| AiTool {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Category of a named tool; unknown names fall back to the heuristic
    pub fn category(&self, name: &str) -> ToolCategory {
        self.get(name)
            .map(|t| t.category())
            .unwrap_or_else(|| tool_category(name))
    }

    /// Execute a tool by name with timeout. `None` if the tool is unknown.
    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> Option<ToolResult> {
        let tool = self.get(name)?;
        let timeout = self.default_timeout;
        let start = Instant::now();

        let result = match tokio::time::timeout(timeout, tool.execute(params, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    tool = name,
                    timeout_secs = timeout.as_secs(),
                    "Tool execution timed out"
                );
                ToolResult::error_with_code(
                    "timeout",
                    format!("Tool '{}' timed out after {} seconds", name, timeout.as_secs()),
                )
            }
        };

        tracing::info!(
            tool = name,
            is_error = result.is_error,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool executed"
        );
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "woo_list_products"
        }

        fn description(&self) -> &str {
            "Slow tool"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(600)).await;
            ToolResult::success("late")
        }
    }

    struct FlaggedTool;

    #[async_trait]
    impl Tool for FlaggedTool {
        fn name(&self) -> &str {
            "popup_publish"
        }

        fn description(&self) -> &str {
            "Publishes a popup"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        fn category(&self) -> ToolCategory {
            ToolCategory::Mutating
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success(r#"{"published": true}"#)
        }
    }

    #[test]
    fn test_tool_category_heuristic() {
        assert_eq!(tool_category("woo_create_product"), ToolCategory::Mutating);
        assert_eq!(tool_category("woo_list_products"), ToolCategory::ReadOnly);
        assert_eq!(tool_category("woo_get_product"), ToolCategory::ReadOnly);
        assert_eq!(tool_category("woo_flush_cache"), ToolCategory::Mutating);
        assert_eq!(tool_category("popup_activate"), ToolCategory::Mutating);
        assert_eq!(tool_category("WOO_DELETE_COUPON"), ToolCategory::Mutating);
        assert_eq!(tool_category("elementor_settings"), ToolCategory::Mutating);
        assert_eq!(tool_category("woo_reset_password"), ToolCategory::ReadOnly);
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResult::error("Test error");
        assert!(result.is_error);
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["ok"], false);
        assert_eq!(parsed["error"]["message"], "Test error");
        assert_eq!(parsed["error"]["code"], "tool_error");

        let denied = ToolResult::error("Command 'db' is not allowed by policy.");
        let parsed: Value = serde_json::from_str(&denied.output).unwrap();
        assert_eq!(parsed["error"]["code"], "policy_denied");
    }

    #[test]
    fn test_error_with_code_envelope() {
        let result = ToolResult::error_with_code("unknown_tool", "Unknown tool: woo_x");
        assert!(result.is_error);
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(
            parsed,
            json!({"ok": false, "error": {"code": "unknown_tool", "message": "Unknown tool: woo_x"}})
        );
    }

    #[test]
    fn test_signals_success() {
        assert!(ToolResult::success(r#"{"ok": true}"#).signals_success());
        assert!(ToolResult::success(r#"{"id": 5}"#).signals_success());
        assert!(ToolResult::success("Success: Updated option.").signals_success());
        assert!(!ToolResult::success(r#"{"ok": false, "error": "x"}"#).signals_success());
        assert!(!ToolResult::success("Error: connection refused").signals_success());
        assert!(!ToolResult::invalid_parameters("bad").signals_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out() {
        let registry = ToolRegistry::from_tools(&[Arc::new(SlowTool) as Arc<dyn Tool>])
            .with_timeout(Duration::from_secs(5));

        let result = registry
            .execute("woo_list_products", json!({}), &ToolContext::default())
            .await
            .unwrap();

        assert!(result.is_error);
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["error"]["code"], "timeout");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_none() {
        let registry = ToolRegistry::new();
        assert!(registry
            .execute("nonexistent_tool", json!({}), &ToolContext::default())
            .await
            .is_none());
    }

    #[test]
    fn test_explicit_category_overrides_name() {
        let registry = ToolRegistry::from_tools(&[
            Arc::new(FlaggedTool) as Arc<dyn Tool>,
            Arc::new(SlowTool) as Arc<dyn Tool>,
        ]);
        assert_eq!(registry.category("popup_publish"), ToolCategory::Mutating);
        assert_eq!(registry.category("woo_list_products"), ToolCategory::ReadOnly);
        assert_eq!(registry.category("missing_update"), ToolCategory::Mutating);

        let names: Vec<String> = registry.ai_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["popup_publish", "woo_list_products"]);
    }
}
