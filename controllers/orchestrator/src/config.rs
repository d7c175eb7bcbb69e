//! Process configuration.
//!
//! Read from environment variables, like the other controllers in this workspace.

use crate::error::OrchestratorError;
use std::net::SocketAddr;
use std::time::Duration;

/// Cluster backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterBackend {
    /// Kubernetes API with KubeVirt and OpenShift templates
    Kube,
    /// No cluster; vApps are recorded only (degraded/offline mode)
    Disabled,
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Handle prefix, e.g. `urn:vcloud`
    pub urn_prefix: String,
    /// Cluster implementation to use
    pub cluster_backend: ClusterBackend,
    /// Namespace holding catalog templates
    pub template_namespace: String,
    /// Create the same-namespace-only NetworkPolicy when ensuring namespaces
    pub network_isolation: bool,
    /// Bounded wait for the cluster cache at startup
    pub cache_sync_timeout: Duration,
    /// Deadline applied by `Orchestrator::with_deadline`
    pub request_timeout: Duration,
    /// Interval of the namespace reconciliation sweep
    pub resync_interval: Duration,
    /// PostgreSQL URL; `None` selects the in-process store
    pub database_url: Option<String>,
    /// PostgreSQL pool size
    pub database_max_connections: u32,
    /// Listener for `/healthz` and `/readyz`
    pub probe_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            urn_prefix: "urn:vcloud".to_string(),
            cluster_backend: ClusterBackend::Kube,
            template_namespace: "openshift".to_string(),
            network_isolation: false,
            cache_sync_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            resync_interval: Duration::from_secs(300),
            database_url: None,
            database_max_connections: 8,
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, OrchestratorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OrchestratorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let urn_prefix = get("VCD_URN_PREFIX").unwrap_or(defaults.urn_prefix);
        if urn_prefix.ends_with(':') {
            return Err(OrchestratorError::InvalidConfig(
                "VCD_URN_PREFIX must not end with ':'".to_string(),
            ));
        }

        let cluster_backend = match get("VCD_CLUSTER_BACKEND").as_deref() {
            None | Some("kube") => ClusterBackend::Kube,
            Some("none") => ClusterBackend::Disabled,
            Some(other) => {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "VCD_CLUSTER_BACKEND must be 'kube' or 'none', got '{}'",
                    other
                )));
            }
        };

        let network_isolation = match get("VCD_NETWORK_ISOLATION") {
            None => defaults.network_isolation,
            Some(v) => parse_bool("VCD_NETWORK_ISOLATION", &v)?,
        };

        let probe_addr = match get("VCD_PROBE_ADDR") {
            None => defaults.probe_addr,
            Some(v) => v.parse().map_err(|e| {
                OrchestratorError::InvalidConfig(format!("VCD_PROBE_ADDR '{}': {}", v, e))
            })?,
        };

        Ok(Self {
            urn_prefix,
            cluster_backend,
            template_namespace: get("VCD_TEMPLATE_NAMESPACE").unwrap_or(defaults.template_namespace),
            network_isolation,
            cache_sync_timeout: seconds(&get, "VCD_CACHE_SYNC_TIMEOUT_SECS", defaults.cache_sync_timeout)?,
            request_timeout: seconds(&get, "VCD_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
            resync_interval: seconds(&get, "VCD_RESYNC_INTERVAL_SECS", defaults.resync_interval)?,
            database_url: get("DATABASE_URL"),
            database_max_connections: match get("VCD_DB_MAX_CONNECTIONS") {
                None => defaults.database_max_connections,
                Some(v) => v.parse().map_err(|e| {
                    OrchestratorError::InvalidConfig(format!("VCD_DB_MAX_CONNECTIONS '{}': {}", v, e))
                })?,
            },
            probe_addr,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, OrchestratorError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(OrchestratorError::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

fn seconds<G>(get: &G, key: &str, default: Duration) -> Result<Duration, OrchestratorError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(v) => match v.parse::<u64>() {
            Ok(0) | Err(_) => Err(OrchestratorError::InvalidConfig(format!(
                "{} must be a positive number of seconds, got '{}'",
                key, v
            ))),
            Ok(secs) => Ok(Duration::from_secs(secs)),
        },
    }
}
