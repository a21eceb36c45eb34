//! Provider configuration parsing
//!
//! Reads the provider list in the `.mcp.json` shape:
//!
//! ```json
//! {"mcpServers": {"woo": {"command": "storepilot-provider", "args": ["--catalog", "woo.json"]}}}
//! ```
//!
//! `${VAR}` references in env values are expanded from the process environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Provider list file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersConfig {
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, ProviderConfigRaw>,
}

/// One provider entry as written in the file
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfigRaw {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// A provider ready to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    /// Provider prefix for qualified tool names
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl ProvidersConfig {
    /// Load from a file. A missing file means no providers.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("No provider config found at {:?}", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;

        let config: ProvidersConfig =
            serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;

        tracing::info!(
            "Loaded provider config with {} providers from {:?}",
            config.mcp_servers.len(),
            path
        );

        Ok(config)
    }

    /// Providers with env expanded, in name order
    pub fn providers(&self) -> Vec<ProviderSpec> {
        self.mcp_servers
            .iter()
            .map(|(name, raw)| ProviderSpec {
                name: name.clone(),
                command: raw.command.clone(),
                args: raw.args.clone(),
                env: raw
                    .env
                    .iter()
                    .map(|(k, v)| (k.clone(), expand_env_var(v)))
                    .collect(),
            })
            .collect()
    }
}

/// Expand `${VAR}` references; unknown variables expand to nothing
fn expand_env_var(s: &str) -> String {
    let mut result = s.to_string();
    let mut search_from = 0;

    while let Some(offset) = result[search_from..].find("${") {
        let start = search_from + offset;
        let Some(end_offset) = result[start..].find('}') else {
            break;
        };
        let end = start + end_offset;
        let var_name = &result[start + 2..end];
        let value = std::env::var(var_name).unwrap_or_else(|_| {
            tracing::warn!("Provider env references unset variable {}", var_name);
            String::new()
        });
        result.replace_range(start..end + 1, &value);
        search_from = start + value.len();
    }

    result
}
