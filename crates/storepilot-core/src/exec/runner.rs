//! Process spawning seam
//!
//! `KubeCtl` never touches `tokio::process` directly; it goes through a
//! `CommandRunner` so tests can script exit codes and stderr.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Captured output of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code (None when killed by a signal)
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Result of a single attempt
#[derive(Debug)]
pub enum RunOutcome {
    Finished(CommandOutput),
    TimedOut,
}

/// Runs an external program to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> std::io::Result<RunOutcome>;
}

/// Default runner backed by `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRunner;

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> std::io::Result<RunOutcome> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                Ok(RunOutcome::Finished(CommandOutput {
                    status: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }))
            }
            Err(_) => Ok(RunOutcome::TimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_runner_captures_output() {
        let outcome = TokioRunner
            .run(
                "sh",
                &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
                &HashMap::new(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let RunOutcome::Finished(output) = outcome else {
            panic!("expected finished command");
        };
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_tokio_runner_times_out() {
        let outcome = TokioRunner
            .run(
                "sleep",
                &["5".to_string()],
                &HashMap::new(),
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::TimedOut));
    }
}
