//! Per-tenant tool cache
//!
//! The first request for a tenant resolves it, bridges every configured
//! provider and caches the combined tool list under the lower-cased tenant
//! key. Later requests are served from memory. Failures are not cached.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::mcp::{discover, ProviderBridge, ProviderSpec, ToolProvider};
use crate::tenant::{TenantResolver, TenantTarget};
use crate::tools::registry::Tool;

/// Builds the providers serving one tenant
pub trait ProviderFactory: Send + Sync {
    fn providers_for(&self, target: &TenantTarget) -> Vec<Arc<dyn ToolProvider>>;
}

/// One `ProviderBridge` per configured provider
pub struct McpProviderFactory {
    specs: Vec<ProviderSpec>,
    request_timeout: Option<Duration>,
}

impl McpProviderFactory {
    pub fn new(specs: Vec<ProviderSpec>) -> Self {
        Self {
            specs,
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl ProviderFactory for McpProviderFactory {
    fn providers_for(&self, target: &TenantTarget) -> Vec<Arc<dyn ToolProvider>> {
        self.specs
            .iter()
            .map(|spec| {
                let bridge = ProviderBridge::new(spec.clone(), target);
                let bridge = match self.request_timeout {
                    Some(timeout) => bridge.with_request_timeout(timeout),
                    None => bridge,
                };
                Arc::new(bridge) as Arc<dyn ToolProvider>
            })
            .collect()
    }
}

struct CacheEntry {
    tools: Vec<Arc<dyn Tool>>,
    providers: Vec<Arc<dyn ToolProvider>>,
}

/// Process-wide tenant → tools cache
pub struct ToolCache {
    resolver: Arc<TenantResolver>,
    factory: Arc<dyn ProviderFactory>,
    default_store: Option<String>,
    entries: DashMap<String, CacheEntry>,
}

impl ToolCache {
    pub fn new(
        resolver: Arc<TenantResolver>,
        factory: Arc<dyn ProviderFactory>,
        default_store: Option<String>,
    ) -> Self {
        Self {
            resolver,
            factory,
            default_store: default_store.filter(|s| !s.trim().is_empty()),
            entries: DashMap::new(),
        }
    }

    pub fn resolver(&self) -> &Arc<TenantResolver> {
        &self.resolver
    }

    /// Tools for a tenant. Empty if the tenant cannot be resolved.
    pub async fn get_tools(&self, tenant: Option<&str>) -> Vec<Arc<dyn Tool>> {
        let key = match tenant.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t.to_lowercase(),
            None => match self.default_key().await {
                Some(k) => k,
                None => return Vec::new(),
            },
        };

        if let Some(entry) = self.entries.get(&key) {
            debug!(tenant = %key, "Tool cache hit");
            return entry.tools.clone();
        }

        let target = match self.resolver.resolve(&key).await {
            Ok(target) => target,
            Err(e) => {
                warn!(tenant = %key, "Tenant not reachable, no tools bound: {}", e);
                return Vec::new();
            }
        };

        let providers = self.factory.providers_for(&target);
        let discovered = join_all(providers.iter().cloned().map(discover)).await;
        let tools: Vec<Arc<dyn Tool>> = discovered.into_iter().flatten().collect();

        if tools.is_empty() {
            warn!(tenant = %key, "No tools discovered; not caching");
            close_all(&providers).await;
            return tools;
        }

        info!(tenant = %key, count = tools.len(), "Cached tenant tools");
        let (tools, lost_race) = match self.entries.entry(key) {
            Entry::Occupied(existing) => (existing.get().tools.clone(), true),
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry {
                    tools: tools.clone(),
                    providers: providers.clone(),
                });
                (tools, false)
            }
        };
        if lost_race {
            close_all(&providers).await;
        }
        tools
    }

    /// Default tenant: the configured one, else the only store in the directory
    async fn default_key(&self) -> Option<String> {
        if let Some(store) = &self.default_store {
            return Some(store.trim().to_lowercase());
        }
        let stores = self.resolver.directory().list_stores().await?;
        match stores.as_slice() {
            [only] => {
                let label = only.label().trim().to_lowercase();
                (!label.is_empty()).then_some(label)
            }
            _ => None,
        }
    }

    pub fn is_cached(&self, tenant: &str) -> bool {
        self.entries.contains_key(&tenant.trim().to_lowercase())
    }

    /// Drop one tenant's tools and close its providers
    pub async fn invalidate(&self, tenant: &str) {
        if let Some((key, entry)) = self.entries.remove(&tenant.trim().to_lowercase()) {
            info!(tenant = %key, "Invalidated tool cache entry");
            close_all(&entry.providers).await;
        }
    }

    /// Drop every entry and close all providers
    pub async fn clear(&self) {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.invalidate(&key).await;
        }
    }

    /// Close provider connections idle for longer than `idle`. Returns how many closed.
    pub async fn reap_idle(&self, idle: Duration) -> usize {
        let providers: Vec<Arc<dyn ToolProvider>> = self
            .entries
            .iter()
            .flat_map(|e| e.value().providers.clone())
            .collect();
        let mut closed = 0;
        for provider in providers {
            if provider.close_if_idle(idle).await {
                closed += 1;
            }
        }
        if closed > 0 {
            info!(closed, "Reaped idle providers");
        }
        closed
    }
}

async fn close_all(providers: &[Arc<dyn ToolProvider>]) {
    join_all(providers.iter().map(|p| p.close())).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::{ok, ScriptedRunner};
    use crate::exec::{KubeConfig, KubeCtl};
    use crate::mcp::{McpToolDef, McpToolResult};
    use crate::tenant::{StoreRecord, TenantDirectory, WorkerPolling};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDirectory {
        calls: AtomicUsize,
        stores: Vec<StoreRecord>,
    }

    #[async_trait]
    impl TenantDirectory for CountingDirectory {
        async fn list_stores(&self) -> Option<Vec<StoreRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(self.stores.clone())
        }
    }

    struct FakeProvider {
        name: String,
        tools: Vec<&'static str>,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl ToolProvider for FakeProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
            let mut defs = Vec::new();
            for name in &self.tools {
                defs.push(serde_json::from_value(json!({ "name": name }))?);
            }
            Ok(defs)
        }

        async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<McpToolResult> {
            anyhow::bail!("unused")
        }

        async fn close_if_idle(&self, _idle: Duration) -> bool {
            self.closed.fetch_add(1, Ordering::SeqCst);
            true
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeFactory {
        calls: AtomicUsize,
        tools: Vec<&'static str>,
    }

    impl ProviderFactory for FakeFactory {
        fn providers_for(&self, _target: &TenantTarget) -> Vec<Arc<dyn ToolProvider>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            vec![
                Arc::new(FakeProvider {
                    name: "woo".into(),
                    tools: self.tools.clone(),
                    closed: AtomicUsize::new(0),
                }),
                Arc::new(FakeProvider {
                    name: "popup".into(),
                    tools: self.tools.clone(),
                    closed: AtomicUsize::new(0),
                }),
            ]
        }
    }

    struct Harness {
        cache: ToolCache,
        directory: Arc<CountingDirectory>,
        runner: Arc<ScriptedRunner>,
        factory: Arc<FakeFactory>,
    }

    fn harness(stores: &[&str], tools: Vec<&'static str>, default_store: Option<&str>) -> Harness {
        let running = json!({
            "items": [{"metadata": {"name": "wp-0"}, "status": {"phase": "Running"}}]
        })
        .to_string();
        let runner = Arc::new(ScriptedRunner::new((0..4).map(|_| ok(&running)).collect()));
        let kubectl = Arc::new(KubeCtl::new(KubeConfig::default(), runner.clone()));
        let directory = Arc::new(CountingDirectory {
            calls: AtomicUsize::new(0),
            stores: stores
                .iter()
                .map(|s| StoreRecord {
                    name: Some(s.to_string()),
                    ..Default::default()
                })
                .collect(),
        });
        let resolver = Arc::new(TenantResolver::new(
            directory.clone(),
            kubectl,
            WorkerPolling::default(),
        ));
        let factory = Arc::new(FakeFactory {
            calls: AtomicUsize::new(0),
            tools,
        });
        let cache = ToolCache::new(resolver, factory.clone(), default_store.map(String::from));
        Harness {
            cache,
            directory,
            runner,
            factory,
        }
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let h = harness(&["nike"], vec!["list-products", "create-product"], None);

        let first = h.cache.get_tools(Some("Nike")).await;
        assert_eq!(first.len(), 4);
        let directory_calls = h.directory.calls.load(Ordering::SeqCst);
        let runner_calls = h.runner.call_count();
        assert!(directory_calls > 0);
        assert!(runner_calls > 0);

        let second = h.cache.get_tools(Some("nike")).await;

        assert_eq!(second.len(), first.len());
        assert_eq!(h.directory.calls.load(Ordering::SeqCst), directory_calls);
        assert_eq!(h.runner.call_count(), runner_calls);
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 1);

        let mut names: Vec<&str> = second.iter().map(|t| t.name()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "popup_create_product",
                "popup_list_products",
                "woo_create_product",
                "woo_list_products"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_empty_and_not_cached() {
        let h = harness(&["nike"], vec!["list-products"], None);

        assert!(h.cache.get_tools(Some("puma")).await.is_empty());
        assert!(!h.cache.is_cached("puma"));
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_discovery_is_not_cached() {
        let h = harness(&["nike"], vec![], None);

        assert!(h.cache.get_tools(Some("nike")).await.is_empty());
        assert!(!h.cache.is_cached("nike"));
    }

    #[tokio::test]
    async fn test_default_key_from_sole_store() {
        let h = harness(&["Nike"], vec!["list-products"], None);

        assert_eq!(h.cache.get_tools(None).await.len(), 2);
        assert!(h.cache.is_cached("nike"));
    }

    #[tokio::test]
    async fn test_no_default_with_several_stores() {
        let h = harness(&["nike", "adidas"], vec!["list-products"], None);
        assert!(h.cache.get_tools(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_configured_default_store() {
        let h = harness(&["nike", "adidas"], vec!["list-products"], Some("Adidas"));
        assert_eq!(h.cache.get_tools(None).await.len(), 2);
        assert!(h.cache.is_cached("adidas"));
    }

    #[tokio::test]
    async fn test_invalidate_and_reap() {
        let h = harness(&["nike"], vec!["list-products"], None);
        h.cache.get_tools(Some("nike")).await;

        assert_eq!(h.cache.reap_idle(Duration::ZERO).await, 2);

        h.cache.invalidate("NIKE").await;
        assert!(!h.cache.is_cached("nike"));
        assert_eq!(h.cache.reap_idle(Duration::ZERO).await, 0);
    }
}
