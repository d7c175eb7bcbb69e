//! Process wiring: store, cluster backend, watchers, probes and the namespace sweep.

use crate::config::{ClusterBackend, Config};
use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;
use crate::probes::{ProbeState, serve_probes};
use crate::watcher::{StatusReconciler, Watcher};
use cluster_client::{ClusterCache, ClusterClient, ClusterClientTrait};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vcd_store::{MemoryStore, PgStore, StoreTrait};

struct ClusterParts {
    client: kube::Client,
    cache: Arc<ClusterCache>,
    cluster: Arc<dyn ClusterClientTrait>,
}

/// Owns the orchestrator and its background tasks.
pub struct Controller {
    config: Config,
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn StoreTrait>,
    cluster: Option<ClusterParts>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("cluster", &self.cluster.is_some())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Connects the store and, unless disabled, the cluster backend
    ///
    /// Fails when the cluster cache does not sync within `cache_sync_timeout`.
    pub async fn new(config: Config) -> Result<Self, OrchestratorError> {
        let store: Arc<dyn StoreTrait> = match &config.database_url {
            Some(url) => {
                let store = PgStore::connect(url, config.database_max_connections).await?;
                info!("Connected to PostgreSQL store");
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set, using the in-process store; records are lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let cluster = match config.cluster_backend {
            ClusterBackend::Kube => {
                let client = kube::Client::try_default()
                    .await
                    .map_err(|e| OrchestratorError::ClusterUnavailable(format!("Failed to create Kubernetes client: {}", e)))?;
                info!("Kubernetes client created");

                let cache = Arc::new(ClusterCache::start(client.clone(), &config.template_namespace));
                if let Err(e) = cache.wait_ready(config.cache_sync_timeout).await {
                    cache.stop();
                    return Err(e.into());
                }
                let cluster: Arc<dyn ClusterClientTrait> =
                    Arc::new(ClusterClient::new(client.clone()).with_cache(Arc::clone(&cache)));
                Some(ClusterParts { client, cache, cluster })
            }
            ClusterBackend::Disabled => {
                warn!("Cluster backend disabled; vApps are recorded without being materialized");
                None
            }
        };

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            cluster.as_ref().map(|c| Arc::clone(&c.cluster)),
            &config,
        ));

        Ok(Self {
            config,
            orchestrator,
            store,
            cluster,
        })
    }

    /// Request-side entry point
    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Runs the background tasks until a watcher exits or the process is interrupted.
    pub async fn run(self) -> Result<(), OrchestratorError> {
        info!("vCD orchestrator running");

        let probes = tokio::spawn(serve_probes(
            self.config.probe_addr,
            ProbeState {
                store: Arc::clone(&self.store),
                cache: self.cluster.as_ref().map(|c| Arc::clone(&c.cache)),
            },
        ));
        let sweep = self
            .orchestrator
            .has_cluster()
            .then(|| tokio::spawn(resync_loop(Arc::clone(&self.orchestrator), self.config.resync_interval)));

        let mut watchers: Vec<JoinHandle<Result<(), OrchestratorError>>> = Vec::new();
        if let Some(parts) = &self.cluster {
            let reconciler = Arc::new(StatusReconciler::new(Arc::clone(&self.store), Arc::clone(&parts.cluster)));
            let watcher = Arc::new(Watcher::new(parts.client.clone(), reconciler));

            let vm_watcher = Arc::clone(&watcher);
            watchers.push(tokio::spawn(async move { vm_watcher.watch_virtual_machines().await }));
            let instance_watcher = watcher;
            watchers.push(tokio::spawn(async move { instance_watcher.watch_template_instances().await }));
        }

        let has_watchers = !watchers.is_empty();
        let result = tokio::select! {
            res = wait_any(&mut watchers), if has_watchers => res,
            res = tokio::signal::ctrl_c() => {
                match res {
                    Ok(()) => info!("Shutdown requested"),
                    Err(e) => error!("Failed to listen for shutdown signal: {}", e),
                }
                Ok(())
            }
        };

        for watcher in &watchers {
            watcher.abort();
        }
        if let Some(sweep) = sweep {
            sweep.abort();
        }
        probes.abort();
        if let Some(parts) = &self.cluster {
            parts.cache.stop();
        }
        result
    }
}

/// Waits for the first watcher to exit; they should run forever
async fn wait_any(watchers: &mut [JoinHandle<Result<(), OrchestratorError>>]) -> Result<(), OrchestratorError> {
    let (result, index, _) = futures::future::select_all(watchers.iter_mut()).await;
    match result {
        Ok(Ok(())) => {
            warn!("Watcher {} exited", index);
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(e) => Err(OrchestratorError::ClusterUnavailable(format!("Watcher {} panicked: {}", index, e))),
    }
}

/// Converges every VDC namespace on a fixed interval
async fn resync_loop(orchestrator: Arc<Orchestrator>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match orchestrator.reconcile_namespaces().await {
            Ok(0) => {}
            Ok(failed) => warn!("Namespace sweep finished with {} failure(s)", failed),
            Err(e) => error!("Namespace sweep failed: {}", e),
        }
    }
}
