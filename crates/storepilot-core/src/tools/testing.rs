//! In-memory tool cache fixture for agent tests

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::cache::{ProviderFactory, ToolCache};
use crate::exec::testing::{ok, ScriptedRunner};
use crate::exec::{KubeConfig, KubeCtl};
use crate::mcp::{McpContent, McpToolDef, McpToolResult, ToolProvider};
use crate::tenant::{StoreRecord, TenantDirectory, TenantResolver, TenantTarget, WorkerPolling};

struct SingleStore;

#[async_trait]
impl TenantDirectory for SingleStore {
    async fn list_stores(&self) -> Option<Vec<StoreRecord>> {
        Some(vec![StoreRecord {
            name: Some("nike".to_string()),
            ..Default::default()
        }])
    }
}

/// Answers `{"ok": true}` to every call, `{"ok": false}` for tools named `fail-*`
struct StaticProvider {
    tools: Vec<String>,
}

#[async_trait]
impl ToolProvider for StaticProvider {
    fn name(&self) -> &str {
        "woo"
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        let mut defs = Vec::new();
        for name in &self.tools {
            defs.push(serde_json::from_value(json!({ "name": name }))?);
        }
        Ok(defs)
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<McpToolResult> {
        let body = json!({"ok": !name.starts_with("fail")});
        Ok(McpToolResult {
            content: vec![McpContent::text(body.to_string())],
            is_error: false,
        })
    }
}

struct StaticFactory {
    tools: Vec<String>,
}

impl ProviderFactory for StaticFactory {
    fn providers_for(&self, _target: &TenantTarget) -> Vec<Arc<dyn ToolProvider>> {
        vec![Arc::new(StaticProvider {
            tools: self.tools.clone(),
        })]
    }
}

/// Cache over a directory holding only store `nike`, with one `woo` provider
/// exposing `tools`
pub(crate) fn tool_cache_with(tools: &[&str]) -> Arc<ToolCache> {
    let running = json!({
        "items": [{"metadata": {"name": "wp-0"}, "status": {"phase": "Running"}}]
    })
    .to_string();
    let runner = Arc::new(ScriptedRunner::new((0..8).map(|_| ok(&running)).collect()));
    let kubectl = Arc::new(KubeCtl::new(KubeConfig::default(), runner));
    let resolver = Arc::new(TenantResolver::new(
        Arc::new(SingleStore),
        kubectl,
        WorkerPolling::default(),
    ));
    let factory = Arc::new(StaticFactory {
        tools: tools.iter().map(|t| t.to_string()).collect(),
    });
    Arc::new(ToolCache::new(resolver, factory, None))
}
