//! Store name → namespace + worker resolution

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::directory::{StoreRecord, TenantDirectory};
use super::TenantTarget;
use crate::exec::KubeCtl;

/// Label selecting the worker pods of a store
pub const WORKER_LABEL: &str = "app.kubernetes.io/component=wordpress";

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Store {0} not found")]
    NotFound(String),

    #[error("Timeout waiting for a running worker in {namespace} after {}s", .waited.as_secs())]
    Timeout { namespace: String, waited: Duration },
}

/// How long and how often to poll for a running worker
#[derive(Debug, Clone)]
pub struct WorkerPolling {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WorkerPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(900),
        }
    }
}

/// Trim, lowercase and strip a leading `store ` / trailing ` store`
pub fn normalize_store_name(text: &str) -> String {
    let mut name = text.trim().to_lowercase();
    if let Some(rest) = name.strip_prefix("store ") {
        name = rest.to_string();
    }
    if let Some(rest) = name.strip_suffix(" store") {
        name = rest.to_string();
    }
    name.trim().to_string()
}

/// Namespace derived from a store name, always prefixed with `store-`
pub fn store_namespace(store_name: &str) -> String {
    let normalized = normalize_store_name(store_name);
    let cleaned = NON_SLUG_CHARS.replace_all(&normalized, "");
    let slug = SLUG_SEPARATORS.replace_all(&cleaned, "-");
    let slug = slug.trim_matches('-');
    if slug.starts_with("store-") {
        slug.to_string()
    } else {
        format!("store-{}", slug)
    }
}

/// Find the record whose name, id or namespace matches the normalized name
pub fn match_store_record<'a>(store_name: &str, stores: &'a [StoreRecord]) -> Option<&'a StoreRecord> {
    let needle = normalize_store_name(store_name);
    stores.iter().find(|store| {
        [&store.name, &store.id, &store.namespace]
            .into_iter()
            .any(|field| field.as_deref().map(str::to_lowercase).as_deref() == Some(needle.as_str()))
    })
}

/// Resolves tenants against the directory and polls the cluster for workers.
///
/// Workers are cached per namespace for the lifetime of the resolver.
/// Concurrent first resolutions of one namespace may both poll; the
/// result is the same either way.
pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
    kubectl: Arc<KubeCtl>,
    polling: WorkerPolling,
    workers: DashMap<String, String>,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>, kubectl: Arc<KubeCtl>, polling: WorkerPolling) -> Self {
        Self {
            directory,
            kubectl,
            polling,
            workers: DashMap::new(),
        }
    }

    pub fn directory(&self) -> &Arc<dyn TenantDirectory> {
        &self.directory
    }

    pub fn kubectl(&self) -> &Arc<KubeCtl> {
        &self.kubectl
    }

    /// Resolve a store name to its namespace and a running worker
    pub async fn resolve(&self, store_name: &str) -> Result<TenantTarget, ResolveError> {
        let stores = self.directory.list_stores().await.unwrap_or_default();
        let record = match_store_record(store_name, &stores)
            .ok_or_else(|| ResolveError::NotFound(store_name.trim().to_string()))?;

        let namespace = record
            .namespace
            .clone()
            .unwrap_or_else(|| store_namespace(store_name));
        let worker = self.wait_for_worker(&namespace).await?;

        Ok(TenantTarget {
            tenant: normalize_store_name(store_name),
            namespace,
            worker,
        })
    }

    /// Cached worker for a namespace, if any
    pub fn cached_worker(&self, namespace: &str) -> Option<String> {
        self.workers.get(namespace).map(|w| w.value().clone())
    }

    /// Forget the worker cached for a namespace (e.g. after a restart)
    pub fn invalidate(&self, namespace: &str) {
        if self.workers.remove(namespace).is_some() {
            info!(namespace, "Invalidated cached worker");
        }
    }

    pub fn clear(&self) {
        self.workers.clear();
    }

    async fn wait_for_worker(&self, namespace: &str) -> Result<String, ResolveError> {
        if let Some(worker) = self.cached_worker(namespace) {
            return Ok(worker);
        }

        let started = Instant::now();
        while started.elapsed() < self.polling.timeout {
            if let Some(worker) = self.poll_once(namespace).await {
                info!(namespace, worker = %worker, "Found running worker");
                self.workers.insert(namespace.to_string(), worker.clone());
                return Ok(worker);
            }
            tokio::time::sleep(self.polling.interval).await;
        }

        warn!(namespace, "No running worker before timeout");
        Err(ResolveError::Timeout {
            namespace: namespace.to_string(),
            waited: self.polling.timeout,
        })
    }

    async fn poll_once(&self, namespace: &str) -> Option<String> {
        let args: Vec<String> = ["-n", namespace, "get", "pods", "-l", WORKER_LABEL, "-o", "json"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let raw = match self.kubectl.run(&args).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(namespace, "Worker poll failed: {}", e);
                return None;
            }
        };
        let pods: Value = serde_json::from_str(&raw).ok()?;
        first_running_pod(&pods)
    }
}

fn first_running_pod(pods: &Value) -> Option<String> {
    pods.get("items")?.as_array()?.iter().find_map(|pod| {
        let running = pod.pointer("/status/phase").and_then(Value::as_str) == Some("Running");
        let name = pod.pointer("/metadata/name").and_then(Value::as_str)?;
        (running && !name.is_empty()).then(|| name.to_string())
    })
}
