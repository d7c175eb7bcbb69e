//! Liveness and readiness endpoints.
//!
//! `/healthz` answers as long as the process serves HTTP. `/readyz` answers 200 only
//! once the cluster cache has synced (when a cluster backend is configured) and the
//! store responds to a ping.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use cluster_client::ClusterCache;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};
use vcd_store::StoreTrait;

/// Dependencies checked by the readiness probe
#[derive(Clone)]
pub struct ProbeState {
    /// Pinged on every readiness check
    pub store: Arc<dyn StoreTrait>,
    /// Must be synced when a cluster is configured
    pub cache: Option<Arc<ClusterCache>>,
}

impl std::fmt::Debug for ProbeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeState")
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Whether the orchestrator can serve requests
pub async fn readiness(state: &ProbeState) -> bool {
    if let Some(cache) = &state.cache
        && !cache.is_synced()
    {
        debug!("Not ready: cluster cache not synced");
        return false;
    }
    match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            debug!("Not ready: {}", e);
            false
        }
    }
}

async fn readyz(State(state): State<ProbeState>) -> StatusCode {
    if readiness(&state).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn probe_routes(state: ProbeState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// Serve the probe endpoints until the listener fails
pub async fn serve_probes(addr: SocketAddr, state: ProbeState) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind probe endpoint {}: {}", addr, e);
            return;
        }
    };
    info!("Serving probes on {}", addr);
    if let Err(e) = axum::serve(listener, probe_routes(state)).await {
        error!("Probe server error: {}", e);
    }
}
