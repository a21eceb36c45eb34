//! StorePilot Provider
//!
//! Serves a tool catalog over stdin/stdout so the agent can bridge it. Each
//! call is executed on the requesting tenant's worker through kubectl.
//! Logs go to stderr; stdout carries protocol messages only.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;

use storepilot_core::exec::{KubeCtl, TokioRunner};
use storepilot_core::provider::{Catalog, ProviderHost};
use storepilot_core::tenant::{CachedDirectory, HttpDirectory, TenantResolver};
use storepilot_core::RuntimeConfig;

const DIRECTORY_TTL: Duration = Duration::from_secs(5);

/// Stdio tool provider for StorePilot tenants
#[derive(Parser)]
#[command(name = "storepilot-provider", version)]
struct Cli {
    /// Tool catalog (JSON)
    #[arg(long, env = "PROVIDER_CATALOG")]
    catalog: PathBuf,

    /// Tenant used when a call names none
    #[arg(long, env = "STOREPILOT_TENANT")]
    tenant: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = RuntimeConfig::from_env();
    let catalog = Catalog::load(&cli.catalog).await?;
    tracing::info!(
        catalog = %catalog.name,
        tools = catalog.tools.len(),
        tenant = cli.tenant.as_deref().unwrap_or("-"),
        "Provider starting"
    );

    let directory = Arc::new(CachedDirectory::new(
        Arc::new(HttpDirectory::new(config.api_base.clone())?),
        DIRECTORY_TTL,
    ));
    let kubectl = Arc::new(KubeCtl::new(config.kube.clone(), Arc::new(TokioRunner)));
    let resolver = Arc::new(TenantResolver::new(directory, kubectl, config.polling.clone()));

    let host = ProviderHost::new(catalog, resolver, config.cli.clone()).with_default_tenant(cli.tenant);
    host.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}
