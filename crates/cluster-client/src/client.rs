//! Kubernetes cluster client
//!
//! Implements `ClusterClientTrait` on top of `kube::Client`. Reads of namespaces and
//! templates go through `ClusterCache` when one is attached and synced; every write is
//! a direct API call.

use crate::cache::{ClusterCache, label_selector};
use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::{RunStrategy, TemplateInstance, VirtualMachine, template_api_resource};
use k8s_openapi::api::core::v1::{Namespace, ResourceQuota, Secret};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "vcd-orchestrator";

/// Cluster client backed by the Kubernetes API
pub struct ClusterClient {
    client: Client,
    cache: Option<Arc<ClusterCache>>,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("cache", &self.cache)
            .finish()
    }
}

impl ClusterClient {
    /// Create a client without a cache
    pub fn new(client: Client) -> Self {
        Self { client, cache: None }
    }

    /// Create a client from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Attach a read cache
    pub fn with_cache(mut self, cache: Arc<ClusterCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Underlying kube client
    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    fn synced_cache(&self) -> Option<&ClusterCache> {
        self.cache.as_deref().filter(|c| c.is_synced())
    }

    fn templates_api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &template_api_resource())
    }
}

/// Maps a 404 on a lookup to `Ok(None)`
fn optional<T>(result: Result<T, kube::Error>) -> Result<Option<T>, ClusterError> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for ClusterClient {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError> {
        if let Some(cache) = self.synced_cache() {
            debug!("Namespace {} served from cache", name);
            return Ok(cache.namespace(name));
        }
        let api: Api<Namespace> = Api::all(self.client.clone());
        optional(api.get(name).await)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.create(&PostParams::default(), namespace).await?)
    }

    async fn patch_namespace_metadata(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "metadata": {
                "labels": labels,
                "annotations": annotations,
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::background()).await?;
        Ok(())
    }

    async fn get_resource_quota(&self, namespace: &str, name: &str) -> Result<Option<ResourceQuota>, ClusterError> {
        let api: Api<ResourceQuota> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await)
    }

    async fn create_resource_quota(&self, namespace: &str, quota: &ResourceQuota) -> Result<ResourceQuota, ClusterError> {
        let api: Api<ResourceQuota> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&PostParams::default(), quota).await?)
    }

    async fn replace_resource_quota(&self, namespace: &str, quota: &ResourceQuota) -> Result<ResourceQuota, ClusterError> {
        let api: Api<ResourceQuota> = Api::namespaced(self.client.clone(), namespace);
        let name = quota
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ClusterError::NotFound("resource quota without name".to_string()))?;
        Ok(api.replace(name, &PostParams::default(), quota).await?)
    }

    async fn get_network_policy(&self, namespace: &str, name: &str) -> Result<Option<NetworkPolicy>, ClusterError> {
        let api: Api<NetworkPolicy> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await)
    }

    async fn apply_network_policy(&self, namespace: &str, policy: &NetworkPolicy) -> Result<(), ClusterError> {
        let api: Api<NetworkPolicy> = Api::namespaced(self.client.clone(), namespace);
        let name = policy
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ClusterError::NotFound("network policy without name".to_string()))?;
        api.patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(policy))
            .await?;
        Ok(())
    }

    async fn get_template(&self, namespace: &str, name: &str) -> Result<Option<DynamicObject>, ClusterError> {
        if let Some(cached) = self.synced_cache().and_then(|c| c.template(namespace, name)) {
            debug!("Template {}/{} served from cache", namespace, name);
            return Ok(cached);
        }
        optional(self.templates_api(namespace).get(name).await)
    }

    async fn list_templates(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<DynamicObject>, ClusterError> {
        if let Some(cached) = self.synced_cache().and_then(|c| c.templates(namespace, labels)) {
            return Ok(cached);
        }
        let params = ListParams::default().labels(&label_selector(labels));
        let list = self.templates_api(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, ClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&PostParams::default(), secret).await?)
    }

    async fn set_secret_owner(&self, namespace: &str, name: &str, owner: OwnerReference) -> Result<(), ClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "metadata": {
                "ownerReferences": [owner],
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn create_template_instance(&self, namespace: &str, instance: &TemplateInstance) -> Result<TemplateInstance, ClusterError> {
        let api: Api<TemplateInstance> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&PostParams::default(), instance).await?)
    }

    async fn delete_template_instance(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let api: Api<TemplateInstance> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::foreground()).await?;
        Ok(())
    }

    async fn get_virtual_machine(&self, namespace: &str, name: &str) -> Result<Option<VirtualMachine>, ClusterError> {
        let api: Api<VirtualMachine> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await)
    }

    async fn patch_run_strategy(&self, namespace: &str, name: &str, strategy: RunStrategy) -> Result<(), ClusterError> {
        let api: Api<VirtualMachine> = Api::namespaced(self.client.clone(), namespace);
        // `running` and `runStrategy` are mutually exclusive in KubeVirt
        let patch = serde_json::json!({
            "spec": {
                "running": null,
                "runStrategy": strategy.as_str(),
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        Ok(())
    }

    async fn delete_virtual_machine(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let api: Api<VirtualMachine> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}
