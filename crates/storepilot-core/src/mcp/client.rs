//! MCP client for stdio providers
//!
//! Handles JSON-RPC communication with a single provider process.
//! Uses a background receive loop so concurrent requests are matched by id.

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info};

use super::protocol::{
    InitializeParams, InitializeResult, McpRequest, McpResponse, McpToolDef, McpToolResult,
    PeerInfo, ToolCallParams, ToolCallResult, ToolsListResult, PROTOCOL_VERSION,
};
use super::transport::StdioTransport;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type PendingMap = Arc<RwLock<HashMap<i64, oneshot::Sender<Result<Value>>>>>;

/// MCP client for one provider process
pub struct McpClient {
    name: String,
    transport: Arc<StdioTransport>,
    next_id: AtomicI64,
    pending: PendingMap,
    request_timeout: Duration,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl McpClient {
    /// Spawn the provider and start the receive loop
    pub async fn connect(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        info!(provider = name, "Connecting to provider");

        let transport = Arc::new(StdioTransport::spawn(command, args, env).await?);
        let pending: PendingMap = Arc::new(RwLock::new(HashMap::new()));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let recv_transport = Arc::clone(&transport);
        let recv_pending = Arc::clone(&pending);
        let recv_name = name.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Provider {} shutting down receive loop", recv_name);
                        break;
                    }
                    result = recv_transport.receive() => {
                        match result {
                            Ok(message) => {
                                if let Err(e) = handle_message(&message, &recv_pending).await {
                                    error!("Provider {} message error: {}", recv_name, e);
                                }
                            }
                            Err(e) => {
                                debug!("Provider {} receive loop ended: {}", recv_name, e);
                                let mut pending = recv_pending.write().await;
                                for (_, tx) in pending.drain() {
                                    let _ = tx.send(Err(anyhow!("Connection lost")));
                                }
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            name: name.to_string(),
            transport,
            next_id: AtomicI64::new(1),
            pending,
            request_timeout,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Handshake: `initialize` then `notifications/initialized`
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: PeerInfo {
                name: "storepilot".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        };

        let result: InitializeResult = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await
            .inspect_err(|e| error!("Provider {} initialize failed: {}", self.name, e))?;

        info!(
            provider = %self.name,
            protocol = %result.protocol_version,
            "Provider initialized"
        );

        self.notify("notifications/initialized", None).await?;
        Ok(result)
    }

    /// List the provider's tools
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        let result: ToolsListResult = self.request("tools/list", None).await?;
        info!(provider = %self.name, count = result.tools.len(), "Listed provider tools");
        Ok(result.tools)
    }

    /// Call a tool
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments: if arguments.is_null() {
                None
            } else {
                Some(arguments)
            },
        };

        let result: ToolCallResult = self
            .request("tools/call", Some(serde_json::to_value(params)?))
            .await?;

        Ok(result.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn is_alive(&self) -> bool {
        self.transport.is_alive().await
    }

    /// Stop the receive loop and kill the process
    pub async fn shutdown(&self) {
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.try_send(());
        }
        self.transport.kill().await;
    }

    async fn request<R: for<'de> serde::Deserialize<'de>>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<R> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = McpRequest::new(id, method, params);
        let json = serde_json::to_string(&request)?;

        debug!("Provider {} request [{}]: {}", self.name, id, method);

        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(id, tx);

        if let Err(e) = self.transport.send(&json).await {
            self.pending.write().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(serde_json::from_value(value)?),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(anyhow!("Request cancelled")),
            Err(_) => {
                self.pending.write().await.remove(&id);
                Err(anyhow!(
                    "Request timed out after {}s",
                    self.request_timeout.as_secs()
                ))
            }
        }
    }

    /// Send a notification (no response expected)
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        #[derive(serde::Serialize)]
        struct Notification<'a> {
            jsonrpc: &'static str,
            method: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            params: Option<Value>,
        }

        let json = serde_json::to_string(&Notification {
            jsonrpc: "2.0",
            method,
            params,
        })?;
        debug!("Provider {} notify: {}", self.name, method);
        self.transport.send(&json).await
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

/// Route one incoming message to its waiting request
async fn handle_message(message: &str, pending: &RwLock<HashMap<i64, oneshot::Sender<Result<Value>>>>) -> Result<()> {
    let response: McpResponse = serde_json::from_str(message)?;

    if let Some(id) = response.id {
        let mut pending = pending.write().await;
        if let Some(tx) = pending.remove(&id) {
            if let Some(error) = response.error {
                let _ = tx.send(Err(anyhow!("MCP error {}: {}", error.code, error.message)));
            } else {
                let _ = tx.send(Ok(response.result.unwrap_or(Value::Null)));
            }
        }
        return Ok(());
    }

    if let Some(method) = &response.method {
        debug!("Provider notification: {}", method);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending_with(id: i64) -> (PendingMap, oneshot::Receiver<Result<Value>>) {
        let (tx, rx) = oneshot::channel();
        let mut map = HashMap::new();
        map.insert(id, tx);
        (Arc::new(RwLock::new(map)), rx)
    }

    #[tokio::test]
    async fn test_handle_message_routes_result() {
        let (pending, rx) = pending_with(3);
        handle_message(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#, &pending)
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap().unwrap(), json!({"tools": []}));
        assert!(pending.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_handle_message_routes_error() {
        let (pending, rx) = pending_with(4);
        handle_message(
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"Method not found"}}"#,
            &pending,
        )
        .await
        .unwrap();
        let err = rx.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("-32601"));
    }

    #[tokio::test]
    async fn test_handle_message_ignores_notifications() {
        let (pending, _rx) = pending_with(5);
        handle_message(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#, &pending)
            .await
            .unwrap();
        assert_eq!(pending.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_request_fails_when_provider_exits() {
        let client = McpClient::connect(
            "dead",
            "sh",
            &["-c".to_string(), "exit 0".to_string()],
            &HashMap::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(client.initialize().await.is_err());
    }
}
