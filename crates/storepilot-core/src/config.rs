//! Runtime configuration from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ai::openai::OpenAiSettings;
use crate::exec::{CliInvocation, KubeConfig};
use crate::tenant::WorkerPolling;

/// Default maximum messages kept per session
pub const DEFAULT_SESSION_MAX: usize = 60;

/// Everything the runtime reads from the environment
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Inventory service base URL (`ORCH_API_BASE`)
    pub api_base: String,
    pub kube: KubeConfig,
    pub cli: CliInvocation,
    pub polling: WorkerPolling,
    /// Tenant used when a turn names none (`DEFAULT_STORE`)
    pub default_store: Option<String>,
    /// Provider list file (`PROVIDERS_CONFIG`)
    pub providers_path: PathBuf,
    pub provider_idle_timeout: Duration,
    /// `AI_SESSION_MAX`
    pub session_max_messages: usize,
    /// `AGENT_MAX_ITERATIONS`
    pub max_iterations: usize,
    /// None when the model endpoint is not fully configured
    pub model: Option<OpenAiSettings>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8080".to_string(),
            kube: KubeConfig::default(),
            cli: CliInvocation::default(),
            polling: WorkerPolling::default(),
            default_store: None,
            providers_path: PathBuf::from("providers.json"),
            provider_idle_timeout: crate::mcp::DEFAULT_IDLE_TIMEOUT,
            session_max_messages: DEFAULT_SESSION_MAX,
            max_iterations: crate::agent::graph::DEFAULT_MAX_ITERATIONS,
            model: None,
        }
    }
}

impl RuntimeConfig {
    /// Read from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parsed = |key: &str| get(key).and_then(|v| parse_or_warn::<u64>(key, &v));

        let defaults = Self::default();

        let kube = KubeConfig {
            bin: get("KUBECTL_BIN").unwrap_or(defaults.kube.bin),
            kubeconfig: get("KUBECONFIG").or_else(|| get("ORCH_KUBECONFIG")),
            context: get("KUBECTL_CONTEXT"),
            ..defaults.kube
        };

        let admin_user = get("WC_CLI_USER")
            .or_else(|| get("WP_ADMIN_USER"))
            .unwrap_or_else(|| "admin".to_string());
        let cli = CliInvocation::new(
            &get("WP_CLI_BIN").unwrap_or_else(|| "wp".to_string()),
            get("WP_CLI_PHP_ARGS").as_deref(),
            &admin_user,
        );

        let polling = WorkerPolling {
            interval: parsed("WAIT_POLL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.polling.interval),
            timeout: parsed("WAIT_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.polling.timeout),
        };

        let model = match (
            get("AZURE_OPENAI_ENDPOINT"),
            get("AZURE_OPENAI_API_KEY"),
            get("AZURE_OPENAI_DEPLOYMENT"),
        ) {
            (Some(endpoint), Some(key), Some(deployment)) => Some(OpenAiSettings::new(&endpoint, &key, &deployment)),
            _ => None,
        };

        Self {
            api_base: get("ORCH_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            kube,
            cli,
            polling,
            default_store: get("DEFAULT_STORE"),
            providers_path: get("PROVIDERS_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.providers_path),
            provider_idle_timeout: parsed("PROVIDER_IDLE_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_idle_timeout),
            session_max_messages: parsed("AI_SESSION_MAX")
                .map(|v| v as usize)
                .unwrap_or(defaults.session_max_messages),
            max_iterations: parsed("AGENT_MAX_ITERATIONS")
                .map(|v| v as usize)
                .unwrap_or(defaults.max_iterations),
            model,
        }
    }
}

fn parse_or_warn<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}", key, value);
            None
        }
    }
}
