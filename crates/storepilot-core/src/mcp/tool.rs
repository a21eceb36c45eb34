//! Bridged tool wrapper
//!
//! Wraps a provider-declared tool as our Tool trait: validated arguments in,
//! the provider's joined content out.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::bridge::{qualified_tool_name, ToolProvider};
use super::protocol::{format_mcp_result, McpToolDef};
use super::schema::ArgSchema;
use crate::tools::registry::{tool_category, Tool, ToolCategory, ToolContext, ToolResult};

/// A provider tool exposed to the agent loop
pub struct BridgedTool {
    provider: Arc<dyn ToolProvider>,
    raw_name: String,
    full_name: String,
    description: String,
    definition: McpToolDef,
    schema: ArgSchema,
    category: ToolCategory,
}

impl BridgedTool {
    pub fn new(provider: Arc<dyn ToolProvider>, definition: McpToolDef) -> Self {
        let full_name = qualified_tool_name(provider.name(), &definition.name);
        let description = definition
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("MCP tool {}", provider.name()));
        let schema = ArgSchema::from_json_schema(&definition.input_schema);
        let category = match definition.annotations.as_ref().and_then(|a| a.mutating()) {
            Some(true) => ToolCategory::Mutating,
            Some(false) => ToolCategory::ReadOnly,
            None => tool_category(&full_name),
        };

        Self {
            provider,
            raw_name: definition.name.clone(),
            full_name,
            description,
            definition,
            schema,
            category,
        }
    }

    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    pub fn schema(&self) -> &ArgSchema {
        &self.schema
    }
}

#[async_trait]
impl Tool for BridgedTool {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.definition.input_schema.clone()
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolResult {
        let arguments = match self.schema.validate(params) {
            Ok(args) => args,
            Err(e) => return ToolResult::invalid_parameters(format!("Invalid parameters: {}", e)),
        };

        match self.provider.call_tool(&self.raw_name, arguments).await {
            Ok(result) => ToolResult {
                output: format_mcp_result(&result),
                is_error: result.is_error,
            },
            Err(e) => ToolResult::error(format!("Provider error: {:#}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{McpContent, McpToolResult};
    use anyhow::Result;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records calls and echoes the arguments back
    struct EchoProvider {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ToolProvider for EchoProvider {
        fn name(&self) -> &str {
            "woo"
        }

        async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
            Ok(Vec::new())
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult> {
            self.calls.lock().push((name.to_string(), arguments.clone()));
            Ok(McpToolResult {
                content: vec![McpContent::text(json!({"ok": true, "args": arguments}).to_string())],
                is_error: false,
            })
        }
    }

    fn def(value: Value) -> McpToolDef {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_execute_validates_then_forwards_raw_name() {
        let provider = Arc::new(EchoProvider {
            calls: Mutex::new(Vec::new()),
        });
        let tool = BridgedTool::new(
            provider.clone(),
            def(json!({
                "name": "update-stock",
                "inputSchema": {
                    "type": "object",
                    "properties": {"sku": {"type": "string"}, "qty": {"type": "integer"}},
                    "required": ["sku", "qty"]
                }
            })),
        );

        assert_eq!(tool.name(), "woo_update_stock");
        assert_eq!(tool.description(), "MCP tool woo");
        assert_eq!(tool.category(), ToolCategory::Mutating);

        let result = tool
            .execute(json!({"sku": "A1", "qty": "4", "junk": true}), &ToolContext::default())
            .await;
        assert!(!result.is_error);
        assert!(result.signals_success());

        let calls = provider.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("update-stock".to_string(), json!({"sku": "A1", "qty": 4})));
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_provider() {
        let provider = Arc::new(EchoProvider {
            calls: Mutex::new(Vec::new()),
        });
        let tool = BridgedTool::new(
            provider.clone(),
            def(json!({
                "name": "get-product",
                "description": "Fetch a product",
                "inputSchema": {"properties": {"id": {"type": "integer"}}, "required": ["id"]}
            })),
        );

        let result = tool.execute(json!({}), &ToolContext::default()).await;

        assert!(result.is_error);
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["error"]["code"], "invalid_parameters");
        assert!(provider.calls.lock().is_empty());
    }

    #[test]
    fn test_annotations_override_heuristic() {
        let provider = Arc::new(EchoProvider {
            calls: Mutex::new(Vec::new()),
        });
        let tool = BridgedTool::new(
            provider,
            def(json!({
                "name": "settings-report",
                "annotations": {"readOnlyHint": true}
            })),
        );
        assert_eq!(tool.category(), ToolCategory::ReadOnly);
    }
}
