//! Store directory access

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

/// Timeout for inventory service requests
const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(10);

/// One entry of the store directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub status: Option<String>,
}

impl StoreRecord {
    /// Best display name: name, then id, then namespace
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .or(self.namespace.as_deref())
            .unwrap_or("")
    }

    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let field = |key: &str| match obj.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Some(Self {
            id: field("id"),
            name: field("name"),
            namespace: field("namespace"),
            status: field("status"),
        })
    }
}

/// Parse an inventory response: either a bare list or `{"stores": [...]}`.
///
/// Entries that are not objects are skipped. Any other shape yields `None`.
pub fn parse_store_list(value: &Value) -> Option<Vec<StoreRecord>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("stores") {
            Some(Value::Array(items)) => items,
            Some(_) => return None,
            None => return Some(Vec::new()),
        },
        _ => return None,
    };
    Some(items.iter().filter_map(StoreRecord::from_value).collect())
}

/// Source of store records. `None` means the directory could not be read.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn list_stores(&self) -> Option<Vec<StoreRecord>>;
}

/// Inventory service over HTTP (`GET {base}/api/stores`)
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DIRECTORY_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TenantDirectory for HttpDirectory {
    async fn list_stores(&self) -> Option<Vec<StoreRecord>> {
        let url = format!("{}/api/stores", self.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %url, "Store directory request failed: {}", e);
                return None;
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            warn!(url = %url, status = %response.status(), "Store directory returned non-200");
            return None;
        }
        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(url = %url, "Store directory returned malformed JSON: {}", e);
                return None;
            }
        };
        let stores = parse_store_list(&body);
        debug!(count = stores.as_ref().map(Vec::len), "Fetched store directory");
        stores
    }
}

/// Directory wrapper that reuses a fetched listing for a short TTL
pub struct CachedDirectory {
    inner: Arc<dyn TenantDirectory>,
    ttl: Duration,
    cached: Mutex<Option<(Instant, Vec<StoreRecord>)>>,
}

impl CachedDirectory {
    pub fn new(inner: Arc<dyn TenantDirectory>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }

    pub fn clear(&self) {
        *self.cached.lock() = None;
    }
}

#[async_trait]
impl TenantDirectory for CachedDirectory {
    async fn list_stores(&self) -> Option<Vec<StoreRecord>> {
        if let Some((at, stores)) = self.cached.lock().as_ref() {
            if at.elapsed() < self.ttl {
                return Some(stores.clone());
            }
        }
        // Failures are not cached
        let stores = self.inner.list_stores().await?;
        *self.cached.lock() = Some((Instant::now(), stores.clone()));
        Some(stores)
    }
}
