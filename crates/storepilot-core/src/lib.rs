//! StorePilot core
//!
//! Orchestration runtime for an agent operating a fleet of store tenants:
//! the agent loop, session and task-progress tracking, provider bridging
//! with a per-tenant tool cache, tenant resolution and the kubectl executor.

pub mod agent;
pub mod ai;
pub mod config;
pub mod exec;
pub mod mcp;
pub mod provider;
pub mod tenant;
pub mod tools;

pub use config::RuntimeConfig;
