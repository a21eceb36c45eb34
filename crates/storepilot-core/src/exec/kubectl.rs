//! kubectl wrapper
//!
//! Every invocation goes through `KubeCtl::run`, which:
//! - prepends `--context <ctx>` once the context has been resolved (once per process)
//! - applies a per-attempt timeout
//! - retries transient failures (connection refused, timeout, EOF) with backoff
//!
//! Non-transient failures come back immediately with the raw stderr text.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::retry::{with_retry, IsRetryable, RetryConfig};
use super::runner::{CommandRunner, RunOutcome};

/// Default per-attempt command timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Context name fragments preferred when several contexts exist
const PREFERRED_CONTEXT_HINTS: &[&str] = &["k3d", "urumi"];

/// Settings for the kubectl wrapper
#[derive(Debug, Clone)]
pub struct KubeConfig {
    /// kubectl binary
    pub bin: String,
    /// Forwarded as `KUBECONFIG` to the child process
    pub kubeconfig: Option<String>,
    /// Requested context (resolved against the available contexts)
    pub context: Option<String>,
    pub command_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for KubeConfig {
    fn default() -> Self {
        Self {
            bin: "kubectl".to_string(),
            kubeconfig: None,
            context: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

/// Command execution failures
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stderr}")]
    Failed { stderr: String },

    #[error("{last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Outcome of a single attempt, before retry classification
#[derive(Debug)]
enum AttemptError {
    Transient(String),
    Fatal(ExecError),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Transient(msg) => write!(f, "{}", msg),
            AttemptError::Fatal(e) => write!(f, "{}", e),
        }
    }
}

impl IsRetryable for AttemptError {
    fn is_retryable(&self) -> bool {
        matches!(self, AttemptError::Transient(_))
    }
}

/// Whether stderr looks like a transient control-plane failure
pub fn is_transient_failure(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("connection refused") || lower.contains("timeout") || stderr.contains("EOF")
}

/// The cluster CLI, shared process-wide
pub struct KubeCtl {
    config: KubeConfig,
    runner: Arc<dyn CommandRunner>,
    context: OnceCell<Option<String>>,
}

impl KubeCtl {
    pub fn new(config: KubeConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            context: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &KubeConfig {
        &self.config
    }

    fn env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(path) = &self.config.kubeconfig {
            env.insert("KUBECONFIG".to_string(), path.clone());
        }
        env
    }

    /// Resolved context, computed on first use and cached for the process lifetime
    pub async fn context(&self) -> Option<String> {
        self.context
            .get_or_init(|| self.resolve_context())
            .await
            .clone()
    }

    async fn resolve_context(&self) -> Option<String> {
        let requested = self.config.context.as_deref()?;
        let contexts = self.list_contexts().await;
        let chosen = choose_context(requested, &contexts);
        match &chosen {
            Some(ctx) => info!(context = %ctx, "Using kubectl context"),
            None => warn!(
                requested,
                available = contexts.len(),
                "Requested kubectl context not found, running without one"
            ),
        }
        chosen
    }

    async fn list_contexts(&self) -> Vec<String> {
        let args = vec![
            "config".to_string(),
            "get-contexts".to_string(),
            "-o".to_string(),
            "name".to_string(),
        ];
        match self
            .runner
            .run(&self.config.bin, &args, &self.env(), self.config.command_timeout)
            .await
        {
            Ok(RunOutcome::Finished(output)) if output.success() => output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!("Failed to list kubectl contexts: {}", e);
                Vec::new()
            }
        }
    }

    /// Run kubectl with retry, returning trimmed stdout
    pub async fn run(&self, args: &[String]) -> Result<String, ExecError> {
        let mut full_args = Vec::with_capacity(args.len() + 2);
        if let Some(ctx) = self.context().await {
            full_args.push("--context".to_string());
            full_args.push(ctx);
        }
        full_args.extend(args.iter().cloned());

        let env = self.env();
        let full_args = &full_args;
        let env = &env;

        let result = with_retry(&self.config.retry, "kubectl", move |attempt| async move {
            self.attempt(full_args, env, attempt).await
        })
        .await;

        result.map_err(|e| match e {
            AttemptError::Transient(last_error) => ExecError::RetriesExhausted {
                attempts: self.config.retry.max_attempts.max(1),
                last_error,
            },
            AttemptError::Fatal(e) => e,
        })
    }

    /// Run and downgrade any failure into an `Error: ...` string.
    ///
    /// Tool providers hand this text back to the model so it can react
    /// conversationally instead of failing the turn.
    pub async fn run_or_error_string(&self, args: &[String]) -> String {
        match self.run(args).await {
            Ok(stdout) => stdout,
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn attempt(
        &self,
        args: &[String],
        env: &HashMap<String, String>,
        attempt: u32,
    ) -> Result<String, AttemptError> {
        debug!(attempt = attempt + 1, "kubectl {}", args.join(" "));
        let timeout = self.config.command_timeout;
        let outcome = self
            .runner
            .run(&self.config.bin, args, env, timeout)
            .await
            .map_err(|source| {
                AttemptError::Fatal(ExecError::Spawn {
                    program: self.config.bin.clone(),
                    source,
                })
            })?;

        match outcome {
            RunOutcome::TimedOut => Err(AttemptError::Transient(format!(
                "Command timed out after {}s",
                timeout.as_secs()
            ))),
            RunOutcome::Finished(output) if output.success() => Ok(output.stdout.trim().to_string()),
            RunOutcome::Finished(output) => {
                let stderr = output.stderr.trim().to_string();
                if is_transient_failure(&stderr) {
                    Err(AttemptError::Transient(stderr))
                } else {
                    Err(AttemptError::Fatal(ExecError::Failed { stderr }))
                }
            }
        }
    }
}

/// Pick a context: the requested one if present, the sole one, then a
/// conventionally named one.
fn choose_context(requested: &str, contexts: &[String]) -> Option<String> {
    if contexts.iter().any(|c| c == requested) {
        return Some(requested.to_string());
    }
    if contexts.len() == 1 {
        return contexts.first().cloned();
    }
    contexts
        .iter()
        .find(|c| PREFERRED_CONTEXT_HINTS.iter().any(|hint| c.contains(hint)))
        .cloned()
}

/// How the in-worker CLI is invoked and which safety flags it always gets
#[derive(Debug, Clone)]
pub struct CliInvocation {
    /// Interpreter prefix, e.g. `["wp"]` or `["php", "-d", "memory_limit=512M", "/usr/local/bin/wp"]`
    pub interpreter: Vec<String>,
    /// User for the `--user=` flag when none is supplied
    pub admin_user: String,
}

impl Default for CliInvocation {
    fn default() -> Self {
        Self {
            interpreter: vec!["wp".to_string()],
            admin_user: "admin".to_string(),
        }
    }
}

impl CliInvocation {
    /// Build from the CLI binary and optional PHP arguments
    pub fn new(cli_bin: &str, php_args: Option<&str>, admin_user: &str) -> Self {
        let interpreter = match php_args
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .and_then(|a| shell_words::split(a).ok())
        {
            Some(split) => {
                let mut parts = vec!["php".to_string()];
                parts.extend(split);
                parts.push("/usr/local/bin/wp".to_string());
                parts
            }
            None => vec![cli_bin.to_string()],
        };
        Self {
            interpreter,
            admin_user: admin_user.to_string(),
        }
    }

    /// kubectl arguments executing `subcommand` inside the worker
    pub fn exec_args(&self, namespace: &str, worker: &str, subcommand: &[String]) -> Vec<String> {
        let mut args = vec![
            "-n".to_string(),
            namespace.to_string(),
            "exec".to_string(),
            worker.to_string(),
            "--".to_string(),
        ];
        args.extend(self.interpreter.iter().cloned());
        args.extend(subcommand.iter().cloned());

        if !subcommand.iter().any(|a| a == "--allow-root") {
            args.push("--allow-root".to_string());
        }
        if !subcommand.iter().any(|a| a.starts_with("--user=")) {
            args.push(format!("--user={}", self.admin_user));
        }
        args
    }
}
