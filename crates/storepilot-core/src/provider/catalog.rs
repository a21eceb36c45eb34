//! Declarative tool catalog served by the provider host
//!
//! ```json
//! {
//!   "name": "elementor",
//!   "allowlist": {"elementor": {"commands": {"flush-css": {}}}},
//!   "tools": [{
//!     "name": "flush_css",
//!     "description": "Flush Elementor CSS cache",
//!     "input_schema": {"type": "object", "properties": {"store_name": {"type": "string"}}},
//!     "command": ["elementor", "flush-css"],
//!     "guard": {"group": "elementor", "command": "flush-css"}
//!   }]
//! }
//! ```
//!
//! Command tokens may contain `{arg}` placeholders. A token whose
//! placeholder names an absent argument is left out.

use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::policy::AllowList;
use crate::mcp::protocol::{McpToolDef, ToolAnnotations};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap());

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_tenant_arg() -> String {
    "store_name".to_string()
}

fn object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Allow-list entry a tool must pass before its command runs
#[derive(Debug, Clone, Deserialize)]
pub struct Guard {
    pub group: String,
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "object_schema")]
    pub input_schema: Value,
    /// Worker subcommand template
    pub command: Vec<String>,
    #[serde(default)]
    pub guard: Option<Guard>,
    #[serde(default)]
    pub annotations: Option<ToolAnnotations>,
}

impl CatalogTool {
    pub fn definition(&self) -> McpToolDef {
        McpToolDef {
            name: self.name.clone(),
            description: (!self.description.is_empty()).then(|| self.description.clone()),
            input_schema: self.input_schema.clone(),
            annotations: self.annotations.clone(),
        }
    }

    /// Fill the command template from validated arguments
    pub fn render(&self, args: &Map<String, Value>) -> Vec<String> {
        self.command
            .iter()
            .filter_map(|token| render_token(token, args))
            .collect()
    }
}

fn render_token(token: &str, args: &Map<String, Value>) -> Option<String> {
    let mut missing = false;
    let rendered = PLACEHOLDER.replace_all(token, |caps: &regex::Captures| {
        match args.get(&caps[1]).filter(|v| !v.is_null()) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                missing = true;
                String::new()
            }
        }
    });
    (!missing).then(|| rendered.into_owned())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Argument naming the tenant
    #[serde(default = "default_tenant_arg")]
    pub tenant_arg: String,
    #[serde(default)]
    pub allowlist: AllowList,
    #[serde(default)]
    pub tools: Vec<CatalogTool>,
}

impl Catalog {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid catalog {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(raw)?;
        if let Some(dup) = catalog
            .tools
            .iter()
            .enumerate()
            .find(|(i, t)| catalog.tools[..*i].iter().any(|o| o.name == t.name))
        {
            anyhow::bail!("Duplicate tool '{}'", dup.1.name);
        }
        Ok(catalog)
    }

    pub fn tool(&self, name: &str) -> Option<&CatalogTool> {
        self.tools.iter().find(|t| t.name == name)
    }
}
