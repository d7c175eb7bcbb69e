//! Orchestrator error types.
//!
//! Every error carries a machine-readable [`ErrorKind`]. [`OrchestratorError::to_response`]
//! builds the caller-facing body: a generic message per kind plus a best-effort detail
//! that never includes raw cluster error text.

use cluster_client::ClusterError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use vcd_store::StoreError;

/// Errors that can occur in the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Handle has an unknown prefix or kind, or a payload that is not a valid key
    #[error("Malformed handle: {0}")]
    MalformedHandle(String),

    /// Catalog item handle with a catalog segment that is not a UUID
    #[error("Invalid catalog reference: {0}")]
    InvalidCatalogReference(String),

    /// Resource absent, or not visible to the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource visible but the caller lacks rights
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Uniqueness violation
    #[error("Name conflict: {0}")]
    NameConflict(String),

    /// Lifecycle guard rejected the operation
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Resource is being deleted or is otherwise locked
    #[error("Resource conflict: {0}")]
    ResourceConflict(String),

    /// Delete without force while VMs are running
    #[error("Running VMs present: {0}")]
    RunningVmsPresent(String),

    /// Logical record exists but its cluster object does not
    #[error("Resource not found in cluster: {0}")]
    ResourceNotFoundInCluster(String),

    /// Cluster backend unreachable or not configured
    #[error("Cluster unavailable: {0}")]
    ClusterUnavailable(String),

    /// Any other cluster failure
    #[error("Cluster operation failed: {0}")]
    ClusterOperationFailed(#[source] ClusterError),

    /// Request field failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Operation exceeded its deadline
    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Relational store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ClusterError> for OrchestratorError {
    fn from(e: ClusterError) -> Self {
        if e.is_unavailable() {
            OrchestratorError::ClusterUnavailable(e.to_string())
        } else {
            OrchestratorError::ClusterOperationFailed(e)
        }
    }
}

/// Machine-readable error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Handle could not be decoded
    MalformedHandle,
    /// Catalog item handle is not resolvable
    InvalidCatalogReference,
    /// Resource is absent or not visible to the caller
    NotFound,
    /// Caller lacks the required right
    AccessDenied,
    /// Name already taken in its scope
    NameConflict,
    /// Operation not allowed in the current status
    InvalidTransition,
    /// Resource is busy or still referenced
    ResourceConflict,
    /// Deletion blocked by running VMs
    RunningVmsPresent,
    /// Cluster object backing a record is missing
    ResourceNotFoundInCluster,
    /// Cluster or store cannot be reached
    ClusterUnavailable,
    /// Cluster rejected the operation
    ClusterOperationFailed,
    /// Request failed validation
    InvalidRequest,
    /// Request did not finish in time
    DeadlineExceeded,
    /// Unexpected failure
    Internal,
}

impl ErrorKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedHandle => "MALFORMED_HANDLE",
            ErrorKind::InvalidCatalogReference => "INVALID_CATALOG_REFERENCE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::NameConflict => "NAME_CONFLICT",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::ResourceConflict => "RESOURCE_CONFLICT",
            ErrorKind::RunningVmsPresent => "RUNNING_VMS_PRESENT",
            ErrorKind::ResourceNotFoundInCluster => "RESOURCE_NOT_FOUND_IN_CLUSTER",
            ErrorKind::ClusterUnavailable => "CLUSTER_UNAVAILABLE",
            ErrorKind::ClusterOperationFailed => "CLUSTER_OPERATION_FAILED",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// HTTP status class for the kind
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::MalformedHandle
            | ErrorKind::InvalidCatalogReference
            | ErrorKind::InvalidTransition
            | ErrorKind::InvalidRequest => 400,
            ErrorKind::AccessDenied => 403,
            ErrorKind::NotFound | ErrorKind::ResourceNotFoundInCluster => 404,
            ErrorKind::NameConflict | ErrorKind::ResourceConflict | ErrorKind::RunningVmsPresent => 409,
            ErrorKind::ClusterUnavailable => 503,
            ErrorKind::DeadlineExceeded => 504,
            ErrorKind::ClusterOperationFailed | ErrorKind::Internal => 500,
        }
    }

    fn generic_message(&self) -> &'static str {
        match self {
            ErrorKind::MalformedHandle => "The resource identifier is malformed",
            ErrorKind::InvalidCatalogReference => "The catalog item reference is invalid",
            ErrorKind::NotFound => "The requested resource was not found",
            ErrorKind::AccessDenied => "Access to the requested resource is denied",
            ErrorKind::NameConflict => "A resource with this name already exists",
            ErrorKind::InvalidTransition => "The operation is not valid in the current state",
            ErrorKind::ResourceConflict => "The resource is busy or being deleted",
            ErrorKind::RunningVmsPresent => "The resource has running virtual machines",
            ErrorKind::ResourceNotFoundInCluster => "The backing cluster resource was not found",
            ErrorKind::ClusterUnavailable => "The cluster backend is unavailable",
            ErrorKind::ClusterOperationFailed => "The cluster operation failed",
            ErrorKind::InvalidRequest => "The request is invalid",
            ErrorKind::DeadlineExceeded => "The operation timed out",
            ErrorKind::Internal => "An internal error occurred",
        }
    }
}

/// Caller-facing error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// Error class
    pub kind: ErrorKind,
    /// Human-readable summary
    pub message: String,
    /// Extra context safe to show the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OrchestratorError {
    /// Machine-readable kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::MalformedHandle(_) => ErrorKind::MalformedHandle,
            OrchestratorError::InvalidCatalogReference(_) => ErrorKind::InvalidCatalogReference,
            OrchestratorError::NotFound(_) => ErrorKind::NotFound,
            OrchestratorError::AccessDenied(_) => ErrorKind::AccessDenied,
            OrchestratorError::NameConflict(_) => ErrorKind::NameConflict,
            OrchestratorError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            OrchestratorError::ResourceConflict(_) => ErrorKind::ResourceConflict,
            OrchestratorError::RunningVmsPresent(_) => ErrorKind::RunningVmsPresent,
            OrchestratorError::ResourceNotFoundInCluster(_) => ErrorKind::ResourceNotFoundInCluster,
            OrchestratorError::ClusterUnavailable(_) => ErrorKind::ClusterUnavailable,
            OrchestratorError::ClusterOperationFailed(_) => ErrorKind::ClusterOperationFailed,
            OrchestratorError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            OrchestratorError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            OrchestratorError::Store(_) | OrchestratorError::InvalidConfig(_) => ErrorKind::Internal,
        }
    }

    /// Caller-facing body
    pub fn to_response(&self) -> ErrorResponse {
        let kind = self.kind();
        let detail = match self {
            OrchestratorError::MalformedHandle(d)
            | OrchestratorError::InvalidCatalogReference(d)
            | OrchestratorError::NotFound(d)
            | OrchestratorError::AccessDenied(d)
            | OrchestratorError::NameConflict(d)
            | OrchestratorError::InvalidTransition(d)
            | OrchestratorError::ResourceConflict(d)
            | OrchestratorError::RunningVmsPresent(d)
            | OrchestratorError::ResourceNotFoundInCluster(d)
            | OrchestratorError::InvalidRequest(d) => Some(d.clone()),
            OrchestratorError::ClusterOperationFailed(e) => Some(cluster_error_class(e).to_string()),
            OrchestratorError::DeadlineExceeded(d) => Some(format!("deadline {}s", d.as_secs())),
            OrchestratorError::ClusterUnavailable(_)
            | OrchestratorError::Store(_)
            | OrchestratorError::InvalidConfig(_) => None,
        };
        ErrorResponse {
            kind,
            message: kind.generic_message().to_string(),
            detail,
        }
    }
}

fn cluster_error_class(e: &ClusterError) -> &'static str {
    match e {
        ClusterError::NotFound(_) => "cluster object not found",
        ClusterError::Conflict(_) => "cluster object conflict",
        ClusterError::Unavailable(_) | ClusterError::CacheNotReady(_) => "cluster unavailable",
        ClusterError::Rejected(_) => "rejected by the cluster",
        ClusterError::Kube(_) => "cluster api error",
        ClusterError::Serialization(_) => "cluster object encoding error",
    }
}
