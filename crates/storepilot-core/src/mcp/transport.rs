//! MCP stdio transport
//!
//! Newline-delimited JSON over a child process's stdin/stdout. The child's
//! stderr is inherited so provider logs land next to ours.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// Environment keys whose values are masked in logs
fn is_secret(key: &str) -> bool {
    key.contains("API_KEY") || key.contains("TOKEN") || key.contains("PASSWORD")
}

/// Stdio transport for a provider process
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
}

impl StdioTransport {
    /// Spawn a provider process
    pub async fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self> {
        tracing::info!("Spawning provider: {} {:?}", command, args);
        for (k, v) in env {
            let shown = if is_secret(k) { "***" } else { v.as_str() };
            tracing::debug!("  env {}={}", k, shown);
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow!("Command not found: {}. Is it installed and in PATH?", command)
            } else {
                anyhow!("Failed to spawn {}: {}", command, e)
            }
        })?;

        let stdin = child.stdin.take().ok_or_else(|| anyhow!("No stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("No stdout"))?;

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
        })
    }

    /// Send one JSON-RPC message
    pub async fn send(&self, message: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(message.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        tracing::trace!("Sent: {}", message);
        Ok(())
    }

    /// Receive the next JSON-RPC message, skipping blank and non-JSON lines
    pub async fn receive(&self) -> Result<String> {
        let mut stdout = self.stdout.lock().await;

        loop {
            let mut line = String::new();
            let bytes = stdout.read_line(&mut line).await?;

            if bytes == 0 {
                let mut child = self.child.lock().await;
                return match child.try_wait() {
                    Ok(Some(status)) => Err(anyhow!("Provider exited with {}", status)),
                    Ok(None) => Err(anyhow!("Provider closed stdout unexpectedly")),
                    Err(e) => Err(anyhow!("Error checking provider status: {}", e)),
                };
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('{') {
                tracing::trace!("Received: {}", line);
                return Ok(line.to_string());
            }

            tracing::debug!("Skipping non-JSON line: {}", line);
        }
    }

    /// Check if the process is still running
    pub async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }

    /// Kill the process and reap it
    pub async fn kill(&self) {
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            tracing::debug!("Provider kill failed (already exited?): {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_skips_noise() {
        let script = r#"read line; echo 'booting...'; echo; echo '{"echo":1}'"#;
        let transport = StdioTransport::spawn(
            "sh",
            &["-c".to_string(), script.to_string()],
            &HashMap::new(),
        )
        .await
        .unwrap();

        transport.send("{}").await.unwrap();
        let message = transport.receive().await.unwrap();
        assert_eq!(message, r#"{"echo":1}"#);

        assert!(transport.receive().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_command() {
        let result = StdioTransport::spawn("definitely-not-a-provider-binary", &[], &HashMap::new()).await;
        let err = result.err().unwrap();
        assert!(err.to_string().contains("Command not found"));
    }
}
