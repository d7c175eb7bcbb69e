//! ClusterClient trait for mocking
//!
//! This trait abstracts the cluster client so the orchestrator can be unit tested
//! against `MockClusterClient`. Read methods may be served from a cache; write methods
//! must always reach the API server.

use crate::error::ClusterError;
use crds::{RunStrategy, TemplateInstance, VirtualMachine};
use k8s_openapi::api::core::v1::{Namespace, ResourceQuota, Secret};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use std::collections::BTreeMap;

/// Trait for cluster operations
///
/// Lookups return `Ok(None)` for absent objects. Deletes return
/// `Err(ClusterError::NotFound)` for absent objects so callers decide whether that is
/// acceptable. All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Namespaces (cached read)
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError>;
    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError>;
    async fn patch_namespace_metadata(&self, name: &str, labels: &BTreeMap<String, String>, annotations: &BTreeMap<String, String>) -> Result<(), ClusterError>;
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;

    // Resource quotas
    async fn get_resource_quota(&self, namespace: &str, name: &str) -> Result<Option<ResourceQuota>, ClusterError>;
    async fn create_resource_quota(&self, namespace: &str, quota: &ResourceQuota) -> Result<ResourceQuota, ClusterError>;
    async fn replace_resource_quota(&self, namespace: &str, quota: &ResourceQuota) -> Result<ResourceQuota, ClusterError>;

    // Network policies
    async fn get_network_policy(&self, namespace: &str, name: &str) -> Result<Option<NetworkPolicy>, ClusterError>;
    async fn apply_network_policy(&self, namespace: &str, policy: &NetworkPolicy) -> Result<(), ClusterError>;

    // Templates (cached read)
    async fn get_template(&self, namespace: &str, name: &str) -> Result<Option<DynamicObject>, ClusterError>;
    async fn list_templates(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<DynamicObject>, ClusterError>;

    // Parameter secrets
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, ClusterError>;
    async fn set_secret_owner(&self, namespace: &str, name: &str, owner: OwnerReference) -> Result<(), ClusterError>;
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    // Template instances
    async fn create_template_instance(&self, namespace: &str, instance: &TemplateInstance) -> Result<TemplateInstance, ClusterError>;
    async fn delete_template_instance(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    // Virtual machines
    async fn get_virtual_machine(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>, ClusterError>;
    async fn patch_run_strategy(&self, namespace: &str, name: &str, strategy: RunStrategy) -> Result<(), ClusterError>;
    async fn delete_virtual_machine(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}
