//! Stdio provider host
//!
//! Serves a [`Catalog`] over newline-delimited JSON-RPC. A tool call is
//! validated against its schema, checked against the allow-list, resolved
//! to a tenant worker and finally run there through kubectl.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::catalog::Catalog;
use super::policy::denial;
use crate::exec::CliInvocation;
use crate::mcp::protocol::{
    error_codes, InitializeResult, McpContent, PeerInfo, ServerCapabilities, ServerRequest, ServerResponse,
    ToolCallParams, ToolCallResult, ToolsCapability, ToolsListResult, PROTOCOL_VERSION,
};
use crate::mcp::schema::ArgSchema;
use crate::tenant::TenantResolver;

pub struct ProviderHost {
    catalog: Catalog,
    schemas: HashMap<String, ArgSchema>,
    resolver: Arc<TenantResolver>,
    cli: CliInvocation,
    default_tenant: Option<String>,
}

impl ProviderHost {
    pub fn new(catalog: Catalog, resolver: Arc<TenantResolver>, cli: CliInvocation) -> Self {
        let schemas = catalog
            .tools
            .iter()
            .map(|t| (t.name.clone(), ArgSchema::from_json_schema(&t.input_schema)))
            .collect();
        Self {
            catalog,
            schemas,
            resolver,
            cli,
            default_tenant: None,
        }
    }

    /// Tenant used when a call carries none (the bridge exports `STOREPILOT_TENANT`)
    pub fn with_default_tenant(mut self, tenant: Option<String>) -> Self {
        self.default_tenant = tenant.filter(|t| !t.trim().is_empty());
        self
    }

    /// Answer one message. Notifications get no reply.
    pub async fn handle(&self, request: ServerRequest) -> Option<ServerResponse> {
        let Some(id) = request.id else {
            debug!(method = %request.method, "Notification");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => ServerResponse::success(id, self.initialize_result()),
            "ping" => ServerResponse::success(id, json!({})),
            "tools/list" => {
                let result = ToolsListResult {
                    tools: self.catalog.tools.iter().map(|t| t.definition()).collect(),
                };
                ServerResponse::success(id, json!(result))
            }
            "tools/call" => {
                let params: ToolCallParams = match request.params.map(serde_json::from_value).transpose() {
                    Ok(Some(params)) => params,
                    Ok(None) => return Some(ServerResponse::failure(id, error_codes::INVALID_PARAMS, "Missing params")),
                    Err(e) => return Some(ServerResponse::failure(id, error_codes::INVALID_PARAMS, e.to_string())),
                };
                let result = self.call_tool(&params.name, params.arguments.unwrap_or(Value::Null)).await;
                ServerResponse::success(id, json!(result))
            }
            other => ServerResponse::failure(id, error_codes::METHOD_NOT_FOUND, format!("Method not found: {other}")),
        };
        Some(response)
    }

    fn initialize_result(&self) -> Value {
        json!(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            server_info: Some(PeerInfo {
                name: self.catalog.name.clone(),
                version: Some(self.catalog.version.clone()),
            }),
        })
    }

    /// Run one catalog tool. Failures come back as tool results, never as
    /// protocol errors, so the model can explain them.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ToolCallResult {
        let (Some(tool), Some(schema)) = (self.catalog.tool(name), self.schemas.get(name)) else {
            return error_result(format!("Unknown tool: {name}"));
        };

        let args = match schema.validate(arguments) {
            Ok(Value::Object(map)) => map,
            Ok(_) => serde_json::Map::new(),
            Err(e) => return text_result(json!({"ok": false, "error": format!("Invalid parameters: {e}")})),
        };

        if let Some(guard) = &tool.guard {
            if !self.catalog.allowlist.is_allowed(&guard.group, &guard.command) {
                warn!(tool = name, command = %guard.command, "Command denied by policy");
                return text_result(denial(&guard.command));
            }
        }

        let tenant = args
            .get(&self.catalog.tenant_arg)
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.default_tenant.clone());
        let Some(tenant) = tenant else {
            return text_result(json!({"ok": false, "error": format!("Missing {}", self.catalog.tenant_arg)}));
        };

        let target = match self.resolver.resolve(&tenant).await {
            Ok(target) => target,
            Err(e) => {
                warn!(tenant = %tenant, "Failed to resolve store: {}", e);
                return text_result(json!({"ok": false, "error": e.to_string()}));
            }
        };

        let subcommand = tool.render(&args);
        let command = self.cli.exec_args(&target.namespace, &target.worker, &subcommand);
        info!(tool = name, namespace = %target.namespace, "Running tool command");
        let output = self.resolver.kubectl().run_or_error_string(&command).await;

        if output.starts_with("Error:") {
            text_result(json!({"ok": false, "error": output}))
        } else {
            ToolCallResult {
                content: vec![McpContent::text(output)],
                is_error: false,
            }
        }
    }

    /// Serve until the reader reaches end of input
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await.context("Failed to read request")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<ServerRequest>(line) {
                Ok(request) => self.handle(request).await,
                Err(e) => {
                    warn!("Unparseable request: {}", e);
                    Some(ServerResponse::failure(Value::Null, error_codes::PARSE_ERROR, e.to_string()))
                }
            };

            if let Some(response) = response {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        info!("Input closed, provider host exiting");
        Ok(())
    }
}

fn text_result(payload: Value) -> ToolCallResult {
    ToolCallResult {
        content: vec![McpContent::text(payload.to_string())],
        is_error: false,
    }
}

fn error_result(message: String) -> ToolCallResult {
    ToolCallResult {
        content: vec![McpContent::text(message)],
        is_error: true,
    }
}
