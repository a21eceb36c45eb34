//! Tenant resolution
//!
//! Maps a store name to the namespace and live worker that execute its
//! commands. The store directory comes from the inventory service; workers
//! are discovered by polling the cluster.

mod directory;
mod resolver;

pub use directory::{parse_store_list, CachedDirectory, HttpDirectory, StoreRecord, TenantDirectory};
pub use resolver::{
    match_store_record, normalize_store_name, store_namespace, ResolveError, TenantResolver,
    WorkerPolling,
};

use serde::{Deserialize, Serialize};

/// A resolved execution target for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantTarget {
    /// Lower-cased, normalized tenant key
    pub tenant: String,
    pub namespace: String,
    pub worker: String,
}
