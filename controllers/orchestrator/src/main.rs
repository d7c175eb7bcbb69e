//! vCD Orchestrator
//!
//! Provisions VDC namespaces, keeps vApp and VM statuses in sync with the cluster
//! and serves liveness/readiness probes.

use tracing::info;
use tracing_subscriber::EnvFilter;
use vcd_orchestrator::{Config, Controller};
use vcd_orchestrator::config::ClusterBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configure rustls crypto provider before any TLS client is built
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting vCD Orchestrator");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  URN prefix: {}", config.urn_prefix);
    info!(
        "  Cluster backend: {}",
        match config.cluster_backend {
            ClusterBackend::Kube => "kube",
            ClusterBackend::Disabled => "none",
        }
    );
    info!("  Template namespace: {}", config.template_namespace);
    info!("  Network isolation: {}", config.network_isolation);
    info!("  Store: {}", if config.database_url.is_some() { "postgres" } else { "memory" });
    info!("  Probes: {}", config.probe_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
