//! Persistent provider connections
//!
//! One `ProviderBridge` per provider per tenant. The process is spawned on
//! first use, reused for every later call, respawned if it died, and shut
//! down after sitting idle or when the owning cache entry is dropped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::{McpClient, DEFAULT_REQUEST_TIMEOUT};
use super::config::ProviderSpec;
use super::protocol::{McpToolDef, McpToolResult};
use super::tool::BridgedTool;
use crate::tenant::TenantTarget;
use crate::tools::registry::Tool;

/// Idle time after which a provider process is shut down
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// A source of tools speaking the provider protocol
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Prefix used for qualified tool names
    fn name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<McpToolDef>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult>;

    /// Release the underlying connection if unused for `idle`. Returns true if closed.
    async fn close_if_idle(&self, _idle: Duration) -> bool {
        false
    }

    /// Release the underlying connection now
    async fn close(&self) {}
}

/// Provider process bound to one tenant
pub struct ProviderBridge {
    spec: ProviderSpec,
    env: HashMap<String, String>,
    request_timeout: Duration,
    client: Mutex<Option<Arc<McpClient>>>,
    last_used: SyncMutex<Instant>,
}

impl ProviderBridge {
    /// Bridge for `spec`, with the tenant exported to the provider's environment
    pub fn new(spec: ProviderSpec, target: &TenantTarget) -> Self {
        let mut env = spec.env.clone();
        env.insert("STOREPILOT_TENANT".to_string(), target.tenant.clone());
        env.insert("STOREPILOT_NAMESPACE".to_string(), target.namespace.clone());
        env.insert("STOREPILOT_WORKER".to_string(), target.worker.clone());
        Self {
            spec,
            env,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client: Mutex::new(None),
            last_used: SyncMutex::new(Instant::now()),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Live, initialized client; spawns or respawns the process as needed
    async fn client(&self) -> Result<Arc<McpClient>> {
        *self.last_used.lock() = Instant::now();
        let mut slot = self.client.lock().await;

        if let Some(client) = slot.as_ref() {
            if client.is_alive().await {
                return Ok(Arc::clone(client));
            }
            warn!(provider = %self.spec.name, "Provider process died, respawning");
            *slot = None;
        }

        let client = McpClient::connect(
            &self.spec.name,
            &self.spec.command,
            &self.spec.args,
            &self.env,
            self.request_timeout,
        )
        .await
        .with_context(|| format!("Failed to start provider {}", self.spec.name))?;
        client
            .initialize()
            .await
            .with_context(|| format!("Provider {} handshake failed", self.spec.name))?;

        let client = Arc::new(client);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }
}

#[async_trait]
impl ToolProvider for ProviderBridge {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        self.client().await?.list_tools().await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult> {
        let result = self.client().await?.call_tool(name, arguments).await;
        *self.last_used.lock() = Instant::now();
        result
    }

    async fn close_if_idle(&self, idle: Duration) -> bool {
        if self.last_used.lock().elapsed() < idle {
            return false;
        }
        let mut slot = self.client.lock().await;
        match slot.take() {
            Some(client) => {
                info!(provider = %self.spec.name, "Closing idle provider");
                client.shutdown().await;
                true
            }
            None => false,
        }
    }

    async fn close(&self) {
        if let Some(client) = self.client.lock().await.take() {
            debug!(provider = %self.spec.name, "Closing provider");
            client.shutdown().await;
        }
    }
}

/// Qualified name: `{provider}_{raw}` with `-` in the raw name replaced by `_`
pub fn qualified_tool_name(provider: &str, raw: &str) -> String {
    format!("{}_{}", provider, raw.replace('-', "_"))
}

/// List a provider's tools and wrap each one.
///
/// Failures are logged and yield an empty list so other providers still load.
pub async fn discover(provider: Arc<dyn ToolProvider>) -> Vec<Arc<dyn Tool>> {
    match provider.list_tools().await {
        Ok(defs) => defs
            .into_iter()
            .map(|def| Arc::new(BridgedTool::new(Arc::clone(&provider), def)) as Arc<dyn Tool>)
            .collect(),
        Err(e) => {
            warn!(provider = %provider.name(), "Tool discovery failed: {:#}", e);
            Vec::new()
        }
    }
}
