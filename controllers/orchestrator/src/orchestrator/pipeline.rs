//! Template instantiation pipeline.
//!
//! Turns a catalog item into a vApp:
//!
//! 1. validate the request and resolve the target VDC and catalog item for the caller
//! 2. record the vApp (`INSTANTIATING`); the store's uniqueness check arbitrates
//!    concurrent requests for the same name
//! 3. create the parameter Secret, then the TemplateInstance embedding the template
//! 4. make the TemplateInstance own the Secret so the cluster collects both together
//! 5. record the instance reference on the vApp
//!
//! Any failure after step 2 removes the cluster objects created so far and then the
//! vApp record. If the record cannot be removed it is marked `FAILED` instead.
//! Without a cluster backend the vApp is recorded as `RESOLVED` and never materialized.

use super::Orchestrator;
use super::access::Action;
use super::is_dns_label;
use crate::error::OrchestratorError;
use crate::urn::{CatalogItemRef, Kind};
use cluster_client::{ClusterClientTrait, ClusterError};
use crds::{
    LocalSecretReference, MANAGED_BY_LABEL, MANAGED_BY_VALUE, SOURCE_ITEM_ANNOTATION, TemplateInstance,
    TemplateInstanceRequester, TemplateInstanceSpec, VAPP_ID_LABEL, VDC_ID_LABEL, is_catalog_item,
    template_body, template_catalog_id,
};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kube::api::DynamicObject;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vcd_store::{ClusterInstanceRef, Status, StoreError, User, VApp, Vdc};

/// Template parameter defaulted to the vApp name
pub const NAME_PARAMETER: &str = "NAME";

/// Request to instantiate a catalog item into a VDC
#[derive(Debug, Clone, Default)]
pub struct InstantiateRequest {
    /// Target VDC handle
    pub vdc: String,
    /// vApp name, an RFC 1123 label
    pub name: String,
    /// Catalog item handle
    pub catalog_item: String,
    /// vApp description
    pub description: Option<String>,
    /// Template parameters; `NAME` defaults to the vApp name
    pub parameters: BTreeMap<String, String>,
}

/// Cluster name shared by the TemplateInstance and its parameter Secret
///
/// The vApp UUID suffix keeps names unique when a vApp name is reused after deletion.
/// Long vApp names are shortened so the result stays a 63-character label.
pub fn instance_name(vapp: &VApp) -> String {
    let suffix = vapp.id.simple().to_string();
    let end = vapp
        .name
        .char_indices()
        .nth(INSTANCE_PREFIX_MAX)
        .map_or(vapp.name.len(), |(i, _)| i);
    let prefix = &vapp.name[..end];
    format!("{}-{}", prefix, &suffix[..8])
}

/// Longest vApp name prefix that leaves room for `-<8 hex>`
const INSTANCE_PREFIX_MAX: usize = 63 - 9;

fn validate(request: &InstantiateRequest) -> Result<(), OrchestratorError> {
    if !is_dns_label(&request.name) {
        return Err(OrchestratorError::InvalidRequest(format!(
            "vApp name '{}' must be a lowercase RFC 1123 label",
            request.name
        )));
    }
    if let Some(key) = request.parameters.keys().find(|k| k.is_empty()) {
        return Err(OrchestratorError::InvalidRequest(format!(
            "empty template parameter name '{}'",
            key
        )));
    }
    Ok(())
}

impl Orchestrator {
    /// Instantiate a catalog item as a new vApp
    ///
    /// Returns the recorded vApp: `INSTANTIATING` with its instance reference when a
    /// cluster is configured, `RESOLVED` otherwise.
    pub async fn instantiate_template(&self, caller_id: Uuid, request: InstantiateRequest) -> Result<VApp, OrchestratorError> {
        validate(&request)?;
        let caller = self.caller(caller_id).await?;
        let vdc_id = self.codec.decode_as(&request.vdc, Kind::Vdc)?;
        let item = self.codec.decode_catalog_item(&request.catalog_item)?;

        let (vdc, _org) = self.resolve_vdc(&caller, vdc_id, Action::Write).await?;
        let template = self.resolve_catalog_item(&caller, &item).await?;

        if self.store.find_vapp_by_name(vdc.id, &request.name).await?.is_some() {
            return Err(name_conflict(&request.name, &vdc));
        }
        let mut vapp = VApp::new(vdc.id, request.name.clone());
        vapp.description = request.description.clone();
        match self.store.create_vapp(&vapp).await {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => return Err(name_conflict(&request.name, &vdc)),
            Err(e) => return Err(e.into()),
        }
        debug!("Recorded vApp {} in VDC {}", vapp.name, vdc.name);

        let source = self.codec.encode_catalog_item(&item);
        let result = match (&self.cluster, template) {
            (Some(cluster), Some(template)) => {
                self.materialize(cluster, &caller, &vapp, &vdc, &template, &source, &request.parameters)
                    .await
            }
            _ => self.record_resolved(&mut vapp, &source).await,
        };

        match result {
            Ok(instance) => {
                vapp.source_catalog_item = Some(source);
                if let Some(instance) = instance {
                    info!(
                        "Instantiated vApp {} as {}/{}",
                        vapp.name, instance.namespace, instance.name
                    );
                    vapp.cluster_instance_ref = Some(instance);
                } else {
                    info!("Recorded vApp {} without a cluster backend", vapp.name);
                }
                Ok(vapp)
            }
            Err(e) => {
                self.compensate(&vapp).await;
                Err(e)
            }
        }
    }

    /// Check the caller may use the item; returns its template when a cluster is configured
    async fn resolve_catalog_item(&self, caller: &User, item: &CatalogItemRef) -> Result<Option<DynamicObject>, OrchestratorError> {
        let not_found = || OrchestratorError::NotFound(self.codec.encode_catalog_item(item));

        if let Some(catalog_id) = item.catalog_id() {
            self.resolve_catalog(caller, catalog_id, Action::Read).await?;
        }

        let Some(cluster) = &self.cluster else {
            if item.catalog_id().is_none() {
                self.require_any_catalog(caller).await?;
            }
            return Ok(None);
        };

        let template = cluster
            .get_template(&self.template_namespace, item.name())
            .await?
            .filter(is_catalog_item)
            .ok_or_else(not_found)?;
        let labeled_catalog = template_catalog_id(&template).and_then(|id| Uuid::try_parse(id).ok());

        match (item.catalog_id(), labeled_catalog) {
            (Some(requested), Some(labeled)) if requested == labeled => {}
            (Some(_), _) => return Err(not_found()),
            (None, Some(labeled)) => {
                // Legacy handle; authorize against the catalog the template is published in
                self.resolve_catalog(caller, labeled, Action::Read)
                    .await
                    .map_err(|_| not_found())?;
            }
            (None, None) => self.require_any_catalog(caller).await?,
        }
        Ok(Some(template))
    }

    async fn record_resolved(&self, vapp: &mut VApp, source: &str) -> Result<Option<ClusterInstanceRef>, OrchestratorError> {
        self.store.set_vapp_provenance(vapp.id, Some(source), None).await?;
        self.store.update_vapp_status(vapp.id, Status::Resolved).await?;
        vapp.status = Status::Resolved;
        Ok(None)
    }

    #[allow(clippy::too_many_arguments, reason = "each input is a distinct piece of the instantiation")]
    async fn materialize(
        &self,
        cluster: &Arc<dyn ClusterClientTrait>,
        caller: &User,
        vapp: &VApp,
        vdc: &Vdc,
        template: &DynamicObject,
        source: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Option<ClusterInstanceRef>, OrchestratorError> {
        let namespace = vdc.namespace.as_str();
        let name = instance_name(vapp);
        let labels = BTreeMap::from([
            (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
            (VDC_ID_LABEL.to_string(), vdc.id.to_string()),
            (VAPP_ID_LABEL.to_string(), vapp.id.to_string()),
        ]);

        let body = template_body(template).map_err(ClusterError::from)?;

        let mut values = parameters.clone();
        values
            .entry(NAME_PARAMETER.to_string())
            .or_insert_with(|| vapp.name.clone());
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            string_data: Some(values),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        cluster.create_secret(namespace, &secret).await?;

        let mut instance = TemplateInstance::new(
            &name,
            TemplateInstanceSpec {
                template: body,
                secret: Some(LocalSecretReference { name: name.clone() }),
                requester: Some(TemplateInstanceRequester {
                    username: caller.name.clone(),
                }),
            },
        );
        instance.metadata.namespace = Some(namespace.to_string());
        instance.metadata.labels = Some(labels);
        instance.metadata.annotations = Some(BTreeMap::from([(
            SOURCE_ITEM_ANNOTATION.to_string(),
            source.to_string(),
        )]));

        let created = match cluster.create_template_instance(namespace, &instance).await {
            Ok(created) => created,
            Err(e) => {
                delete_quietly(cluster, namespace, &name, false).await;
                return Err(e.into());
            }
        };

        let owned = match created.owner_ref(&()) {
            Some(owner) => cluster
                .set_secret_owner(namespace, &name, owner)
                .await
                .map_err(OrchestratorError::from),
            None => Err(OrchestratorError::ClusterOperationFailed(ClusterError::Rejected(
                format!("template instance {} has no uid", name),
            ))),
        };
        if let Err(e) = owned {
            delete_quietly(cluster, namespace, &name, true).await;
            return Err(e);
        }

        let instance_ref = ClusterInstanceRef {
            namespace: namespace.to_string(),
            name: name.clone(),
        };
        if let Err(e) = self
            .store
            .set_vapp_provenance(vapp.id, Some(source), Some(&instance_ref))
            .await
        {
            delete_quietly(cluster, namespace, &name, true).await;
            return Err(e.into());
        }
        Ok(Some(instance_ref))
    }

    /// Undo the vApp record after a failed instantiation
    async fn compensate(&self, vapp: &VApp) {
        match self.store.delete_vapp(vapp.id).await {
            Ok(()) => debug!("Removed vApp record {} after failed instantiation", vapp.name),
            Err(e) => {
                error!("Failed to remove vApp record {}: {}", vapp.name, e);
                if let Err(e) = self.store.update_vapp_status(vapp.id, Status::Failed).await {
                    error!("Failed to mark vApp {} as FAILED: {}", vapp.name, e);
                }
            }
        }
    }
}

fn name_conflict(name: &str, vdc: &Vdc) -> OrchestratorError {
    OrchestratorError::NameConflict(format!("vApp {} already exists in VDC {}", name, vdc.name))
}

/// Best-effort removal of the instance (when created) and its parameter secret
async fn delete_quietly(cluster: &Arc<dyn ClusterClientTrait>, namespace: &str, name: &str, instance: bool) {
    if instance {
        match cluster.delete_template_instance(namespace, name).await {
            Ok(()) | Err(ClusterError::NotFound(_)) => {}
            Err(e) => warn!("Failed to remove template instance {}/{}: {}", namespace, name, e),
        }
    }
    match cluster.delete_secret(namespace, name).await {
        Ok(()) | Err(ClusterError::NotFound(_)) => {}
        Err(e) => warn!("Failed to remove parameter secret {}/{}: {}", namespace, name, e),
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
