//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object already exists or was modified concurrently (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// API server unreachable
    #[error("Cluster unavailable: {0}")]
    Unavailable(String),

    /// Request rejected by the API server for any other reason
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Any other Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cache did not sync in time
    #[error("Cluster cache not ready: {0}")]
    CacheNotReady(String),
}

impl ClusterError {
    /// Whether the error means the object is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// Whether the error means the cluster could not be reached
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ClusterError::Unavailable(_) | ClusterError::CacheNotReady(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(ref ae) if ae.code == 404 => ClusterError::NotFound(ae.message.clone()),
            kube::Error::Api(ref ae) if ae.code == 409 => ClusterError::Conflict(ae.message.clone()),
            kube::Error::Api(ref ae) if ae.code == 503 => ClusterError::Unavailable(ae.message.clone()),
            kube::Error::Api(ref ae) => ClusterError::Rejected(format!("{} ({})", ae.message, ae.code)),
            kube::Error::HyperError(_) | kube::Error::Service(_) => {
                ClusterError::Unavailable(e.to_string())
            }
            other => ClusterError::Kube(other),
        }
    }
}
