//! Tool provider host: serves a declarative catalog of worker commands over
//! the stdio protocol the bridge speaks.

pub mod catalog;
pub mod host;
pub mod policy;

pub use catalog::{Catalog, CatalogTool, Guard};
pub use host::ProviderHost;
pub use policy::{denial, AllowList};
