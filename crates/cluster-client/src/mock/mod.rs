//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClientTrait` so the
//! orchestrator can be tested without a cluster.
//!
//! The mock is organized into domain-specific modules:
//! - `namespaces.rs` - namespaces, resource quotas, network policies
//! - `templates.rs` - templates, template instances, parameter secrets
//! - `workloads.rs` - KubeVirt virtual machines
//!
//! Every successful write is appended to a mutation log (`"<operation>:<namespace>/<name>"`),
//! which lets tests assert that an idempotent call performed no writes. Failures can be
//! injected per operation name with [`MockClusterClient::fail_on`].

mod namespaces;
mod templates;
mod workloads;

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::{RunStrategy, TemplateInstance, VirtualMachine};
use k8s_openapi::api::core::v1::{Namespace, ResourceQuota, Secret};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Namespaced object key
pub(crate) type Key = (String, String);

/// Failure injected for an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureMode {
    /// Respond as if the object is absent
    NotFound,
    /// Respond with an HTTP 409
    Conflict,
    /// Respond as if the API server is unreachable
    Unavailable,
    /// Respond with any other API error carrying this message
    Api(String),
}

impl FailureMode {
    fn to_error(&self, operation: &str) -> ClusterError {
        match self {
            FailureMode::NotFound => ClusterError::NotFound(format!("{}: injected not found", operation)),
            FailureMode::Conflict => ClusterError::Conflict(format!("{}: injected conflict", operation)),
            FailureMode::Unavailable => ClusterError::Unavailable(format!("{}: injected outage", operation)),
            FailureMode::Api(msg) => ClusterError::Rejected(format!("{}: {}", operation, msg)),
        }
    }
}

/// Mock ClusterClient for testing
///
/// Stores objects in memory. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    pub(crate) namespaces: Arc<Mutex<BTreeMap<String, Namespace>>>,
    pub(crate) quotas: Arc<Mutex<HashMap<Key, ResourceQuota>>>,
    pub(crate) network_policies: Arc<Mutex<HashMap<Key, NetworkPolicy>>>,
    pub(crate) templates: Arc<Mutex<HashMap<Key, DynamicObject>>>,
    pub(crate) template_instances: Arc<Mutex<HashMap<Key, TemplateInstance>>>,
    pub(crate) secrets: Arc<Mutex<HashMap<Key, Secret>>>,
    pub(crate) virtual_machines: Arc<Mutex<HashMap<Key, VirtualMachine>>>,
    pub(crate) failures: Arc<Mutex<HashMap<String, FailureMode>>>,
    pub(crate) mutations: Arc<Mutex<Vec<String>>>,
    // Counter for generating UIDs and resource versions
    pub(crate) next_uid: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient")
            .field("mutations", &self.mutations())
            .finish()
    }
}

impl MockClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `operation` fail until [`clear_failures`](Self::clear_failures)
    pub fn fail_on(&self, operation: &str, mode: FailureMode) {
        self.failures.lock().unwrap().insert(operation.to_string(), mode);
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Snapshot of the mutation log
    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    /// Number of writes performed so far
    pub fn mutation_count(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }

    /// Add a template (for test setup)
    pub fn add_template(&self, namespace: &str, name: &str, labels: BTreeMap<String, String>) {
        templates::add_template(self, namespace, name, labels);
    }

    /// Add a virtual machine (for test setup)
    pub fn add_virtual_machine(&self, namespace: &str, name: &str, strategy: Option<RunStrategy>) {
        workloads::add_virtual_machine(self, namespace, name, strategy);
    }

    /// Stored namespace
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.namespaces.lock().unwrap().get(name).cloned()
    }

    /// Stored resource quota
    pub fn resource_quota(&self, namespace: &str, name: &str) -> Option<ResourceQuota> {
        self.quotas.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Stored network policy
    pub fn network_policy(&self, namespace: &str, name: &str) -> Option<NetworkPolicy> {
        self.network_policies.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Stored secret
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Stored template instance
    pub fn template_instance(&self, namespace: &str, name: &str) -> Option<TemplateInstance> {
        self.template_instances.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Stored virtual machine
    pub fn virtual_machine(&self, namespace: &str, name: &str) -> Option<VirtualMachine> {
        self.virtual_machines.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Returns the injected failure for `operation`, if any
    pub(crate) fn check(&self, operation: &str) -> Result<(), ClusterError> {
        match self.failures.lock().unwrap().get(operation) {
            Some(mode) => Err(mode.to_error(operation)),
            None => Ok(()),
        }
    }

    pub(crate) fn record(&self, operation: &str, namespace: &str, name: &str) {
        let entry = if namespace.is_empty() {
            format!("{}:{}", operation, name)
        } else {
            format!("{}:{}/{}", operation, namespace, name)
        };
        self.mutations.lock().unwrap().push(entry);
    }

    pub(crate) fn next_uid(&self) -> String {
        let mut uid = self.next_uid.lock().unwrap();
        *uid += 1;
        format!("mock-uid-{}", *uid)
    }
}

pub(crate) fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    // Namespaces - delegated to namespaces module
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError> {
        namespaces::get_namespace(self, name)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError> {
        namespaces::create_namespace(self, namespace)
    }

    async fn patch_namespace_metadata(&self, name: &str, labels: &BTreeMap<String, String>, annotations: &BTreeMap<String, String>) -> Result<(), ClusterError> {
        namespaces::patch_namespace_metadata(self, name, labels, annotations)
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        namespaces::delete_namespace(self, name)
    }

    async fn get_resource_quota(&self, namespace: &str, name: &str) -> Result<Option<ResourceQuota>, ClusterError> {
        namespaces::get_resource_quota(self, namespace, name)
    }

    async fn create_resource_quota(&self, namespace: &str, quota: &ResourceQuota) -> Result<ResourceQuota, ClusterError> {
        namespaces::create_resource_quota(self, namespace, quota)
    }

    async fn replace_resource_quota(&self, namespace: &str, quota: &ResourceQuota) -> Result<ResourceQuota, ClusterError> {
        namespaces::replace_resource_quota(self, namespace, quota)
    }

    async fn get_network_policy(&self, namespace: &str, name: &str) -> Result<Option<NetworkPolicy>, ClusterError> {
        namespaces::get_network_policy(self, namespace, name)
    }

    async fn apply_network_policy(&self, namespace: &str, policy: &NetworkPolicy) -> Result<(), ClusterError> {
        namespaces::apply_network_policy(self, namespace, policy)
    }

    // Templates - delegated to templates module
    async fn get_template(&self, namespace: &str, name: &str) -> Result<Option<DynamicObject>, ClusterError> {
        templates::get_template(self, namespace, name)
    }

    async fn list_templates(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<DynamicObject>, ClusterError> {
        templates::list_templates(self, namespace, labels)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, ClusterError> {
        templates::create_secret(self, namespace, secret)
    }

    async fn set_secret_owner(&self, namespace: &str, name: &str, owner: OwnerReference) -> Result<(), ClusterError> {
        templates::set_secret_owner(self, namespace, name, owner)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        templates::delete_secret(self, namespace, name)
    }

    async fn create_template_instance(&self, namespace: &str, instance: &TemplateInstance) -> Result<TemplateInstance, ClusterError> {
        templates::create_template_instance(self, namespace, instance)
    }

    async fn delete_template_instance(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        templates::delete_template_instance(self, namespace, name)
    }

    // Virtual machines - delegated to workloads module
    async fn get_virtual_machine(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>, ClusterError> {
        workloads::get_virtual_machine(self, namespace, name)
    }

    async fn patch_run_strategy(&self, namespace: &str, name: &str, strategy: RunStrategy) -> Result<(), ClusterError> {
        workloads::patch_run_strategy(self, namespace, name, strategy)
    }

    async fn delete_virtual_machine(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        workloads::delete_virtual_machine(self, namespace, name)
    }
}
