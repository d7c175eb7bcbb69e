//! VDC namespace provisioning.
//!
//! Converges the namespace bound to a VDC: the namespace itself with its identity
//! labels and annotations, the `vdc-quota` ResourceQuota derived from the allocation
//! model, and optionally the `vdc-isolation` NetworkPolicy.
//!
//! Each step reads the current object and only writes when it differs, so repeated
//! calls converge without writes. A namespace carrying another VDC's identity label is
//! never touched.

use super::Orchestrator;
use super::access::{Action, require_system_admin};
use crate::error::OrchestratorError;
use crate::quota::{
    NETWORK_POLICY_NAME, QUOTA_NAME, build_network_policy, build_quota, namespace_annotations, namespace_labels,
};
use crate::urn::{Kind, UrnCodec};
use cluster_client::quantity::hard_limits_equal;
use cluster_client::{ClusterClientTrait, ClusterError};
use crds::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, VDC_ID_LABEL, sanitize_label_value};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vcd_store::{Organization, Vdc};

/// Ownership of the namespace a VDC is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceState {
    /// No namespace of that name exists
    Absent,
    /// Exists without the managed-by label; adopted on ensure
    Unmanaged,
    /// Managed and bound to this VDC
    Managed,
    /// Managed and bound to another VDC (label value)
    ManagedByOther(String),
}

/// Result of converging a VDC namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The namespace was created with its quota and policy
    Created,
    /// An unmanaged namespace was labeled and converged
    Adopted,
    /// The namespace existed and at least one object was rewritten
    Updated,
    /// Nothing differed; no write was made
    Unchanged,
}

/// Classify an existing (or absent) namespace against a VDC
pub fn classify(namespace: Option<&Namespace>, vdc: &Vdc) -> NamespaceState {
    let Some(ns) = namespace else {
        return NamespaceState::Absent;
    };
    let labels = ns.metadata.labels.as_ref();
    let managed = labels
        .and_then(|l| l.get(MANAGED_BY_LABEL))
        .is_some_and(|v| v == MANAGED_BY_VALUE);
    if !managed {
        return NamespaceState::Unmanaged;
    }
    let expected = sanitize_label_value(&vdc.id.to_string());
    match labels.and_then(|l| l.get(VDC_ID_LABEL)) {
        Some(bound) if *bound == expected => NamespaceState::Managed,
        Some(bound) => NamespaceState::ManagedByOther(bound.clone()),
        None => NamespaceState::ManagedByOther("unknown".to_string()),
    }
}

/// Whether every desired entry is present with the same value
fn contains_all(actual: Option<&BTreeMap<String, String>>, desired: &BTreeMap<String, String>) -> bool {
    desired
        .iter()
        .all(|(k, v)| actual.and_then(|a| a.get(k)) == Some(v))
}

/// Converges VDC namespaces against one cluster
pub struct NamespaceProvisioner {
    cluster: Arc<dyn ClusterClientTrait>,
    codec: UrnCodec,
    network_isolation: bool,
}

impl NamespaceProvisioner {
    /// Provisioner writing through `cluster`
    pub fn new(cluster: Arc<dyn ClusterClientTrait>, codec: UrnCodec, network_isolation: bool) -> Self {
        Self {
            cluster,
            codec,
            network_isolation,
        }
    }

    /// Current ownership of the VDC's namespace
    pub async fn state(&self, vdc: &Vdc) -> Result<NamespaceState, OrchestratorError> {
        let ns = self.cluster.get_namespace(&vdc.namespace).await?;
        Ok(classify(ns.as_ref(), vdc))
    }

    /// Converge namespace, quota and network policy for a VDC
    ///
    /// A freshly created namespace is deleted again if its quota cannot be applied, so
    /// no namespace is left without limits.
    pub async fn ensure(&self, vdc: &Vdc, org: &Organization) -> Result<EnsureOutcome, OrchestratorError> {
        let labels = namespace_labels(vdc, org);
        let annotations = namespace_annotations(vdc, org, &self.codec);
        let existing = self.cluster.get_namespace(&vdc.namespace).await?;

        match classify(existing.as_ref(), vdc) {
            NamespaceState::ManagedByOther(owner) => Err(OrchestratorError::NameConflict(format!(
                "namespace {} is bound to VDC {}",
                vdc.namespace, owner
            ))),
            NamespaceState::Absent => {
                let namespace = Namespace {
                    metadata: ObjectMeta {
                        name: Some(vdc.namespace.clone()),
                        labels: Some(labels.clone()),
                        annotations: Some(annotations.clone()),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                match self.cluster.create_namespace(&namespace).await {
                    Ok(_) => {}
                    Err(ClusterError::Conflict(_)) => {
                        // Lost a race with a concurrent ensure; converge the winner's object
                        debug!("Namespace {} created concurrently", vdc.namespace);
                        return self.converge_existing(vdc, &labels, &annotations, None).await;
                    }
                    Err(e) => return Err(e.into()),
                }
                info!("Created namespace {} for VDC {}", vdc.namespace, vdc.name);

                if let Err(e) = self.ensure_quota(vdc, &labels).await {
                    error!(
                        "Quota for VDC {} failed, removing namespace {}: {}",
                        vdc.name, vdc.namespace, e
                    );
                    if let Err(cleanup) = self.cluster.delete_namespace(&vdc.namespace).await {
                        error!("Failed to remove namespace {}: {}", vdc.namespace, cleanup);
                    }
                    return Err(e);
                }
                self.ensure_network_policy(vdc, &labels).await?;
                Ok(EnsureOutcome::Created)
            }
            NamespaceState::Unmanaged => {
                warn!(
                    "Adopting unmanaged namespace {} for VDC {}",
                    vdc.namespace, vdc.name
                );
                self.converge_existing(vdc, &labels, &annotations, existing.as_ref())
                    .await?;
                Ok(EnsureOutcome::Adopted)
            }
            NamespaceState::Managed => {
                self.converge_existing(vdc, &labels, &annotations, existing.as_ref())
                    .await
            }
        }
    }

    async fn converge_existing(
        &self,
        vdc: &Vdc,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
        existing: Option<&Namespace>,
    ) -> Result<EnsureOutcome, OrchestratorError> {
        let metadata_current = existing.is_some_and(|ns| {
            contains_all(ns.metadata.labels.as_ref(), labels)
                && contains_all(ns.metadata.annotations.as_ref(), annotations)
        });
        let mut changed = false;
        if !metadata_current {
            self.cluster
                .patch_namespace_metadata(&vdc.namespace, labels, annotations)
                .await?;
            changed = true;
        }
        changed |= self.ensure_quota(vdc, labels).await?;
        changed |= self.ensure_network_policy(vdc, labels).await?;

        if changed {
            info!("Updated namespace {} for VDC {}", vdc.namespace, vdc.name);
            Ok(EnsureOutcome::Updated)
        } else {
            debug!("Namespace {} already converged", vdc.namespace);
            Ok(EnsureOutcome::Unchanged)
        }
    }

    /// Create or replace the VDC quota; returns whether a write happened
    async fn ensure_quota(&self, vdc: &Vdc, labels: &BTreeMap<String, String>) -> Result<bool, OrchestratorError> {
        let mut desired = build_quota(vdc, labels);
        match self.cluster.get_resource_quota(&vdc.namespace, QUOTA_NAME).await? {
            None => {
                self.cluster
                    .create_resource_quota(&vdc.namespace, &desired)
                    .await?;
                debug!("Created quota in {}", vdc.namespace);
                Ok(true)
            }
            Some(current) => {
                let current_hard = current.spec.as_ref().and_then(|s| s.hard.as_ref());
                let desired_hard = desired.spec.as_ref().and_then(|s| s.hard.as_ref());
                if hard_limits_equal(current_hard, desired_hard) {
                    return Ok(false);
                }
                desired.metadata.resource_version = current.metadata.resource_version.clone();
                self.cluster
                    .replace_resource_quota(&vdc.namespace, &desired)
                    .await?;
                debug!("Replaced quota in {}", vdc.namespace);
                Ok(true)
            }
        }
    }

    /// Apply the isolation policy when enabled; returns whether a write happened
    ///
    /// Disabling isolation leaves an existing policy in place.
    async fn ensure_network_policy(&self, vdc: &Vdc, labels: &BTreeMap<String, String>) -> Result<bool, OrchestratorError> {
        if !self.network_isolation {
            return Ok(false);
        }
        let desired = build_network_policy(vdc, labels);
        let current = self
            .cluster
            .get_network_policy(&vdc.namespace, NETWORK_POLICY_NAME)
            .await?;
        if current.is_some_and(|p| p.spec == desired.spec) {
            return Ok(false);
        }
        self.cluster
            .apply_network_policy(&vdc.namespace, &desired)
            .await?;
        debug!("Applied network policy in {}", vdc.namespace);
        Ok(true)
    }

    /// Delete the VDC's namespace
    ///
    /// Absent namespaces are fine. Namespaces not bound to this VDC are left alone.
    pub async fn teardown(&self, vdc: &Vdc) -> Result<(), OrchestratorError> {
        match self.state(vdc).await? {
            NamespaceState::Absent => {
                debug!("Namespace {} already absent", vdc.namespace);
                return Ok(());
            }
            NamespaceState::Unmanaged | NamespaceState::ManagedByOther(_) => {
                warn!(
                    "Not deleting namespace {}: not bound to VDC {}",
                    vdc.namespace, vdc.name
                );
                return Ok(());
            }
            NamespaceState::Managed => {}
        }
        match self.cluster.delete_namespace(&vdc.namespace).await {
            Ok(()) => {
                info!("Deleted namespace {} of VDC {}", vdc.namespace, vdc.name);
                Ok(())
            }
            Err(ClusterError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Orchestrator {
    /// Converge the namespace of a VDC (system administrators only)
    pub async fn ensure_namespace(&self, caller_id: Uuid, vdc_handle: &str) -> Result<EnsureOutcome, OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        require_system_admin(&caller)?;
        let id = self.codec.decode_as(vdc_handle, Kind::Vdc)?;
        let (vdc, org) = self.resolve_vdc(&caller, id, Action::Write).await?;
        self.provisioner()?.ensure(&vdc, &org).await
    }

    /// Delete the namespace of a VDC (system administrators only)
    pub async fn teardown_namespace(&self, caller_id: Uuid, vdc_handle: &str) -> Result<(), OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        require_system_admin(&caller)?;
        let id = self.codec.decode_as(vdc_handle, Kind::Vdc)?;
        let (vdc, _) = self.resolve_vdc(&caller, id, Action::Write).await?;
        self.provisioner()?.teardown(&vdc).await
    }

    /// Converge the namespaces of every VDC
    ///
    /// Failures are logged per VDC and do not stop the sweep. Returns the number of
    /// VDCs whose namespace failed to converge.
    pub async fn reconcile_namespaces(&self) -> Result<usize, OrchestratorError> {
        let provisioner = self.provisioner()?;
        let mut failed = 0;
        for org in self.store.list_orgs().await? {
            for vdc in self.store.list_vdcs_by_org(org.id).await? {
                match provisioner.ensure(&vdc, &org).await {
                    Ok(EnsureOutcome::Unchanged) => {}
                    Ok(outcome) => info!("Namespace sweep: VDC {} {:?}", vdc.name, outcome),
                    Err(e) => {
                        failed += 1;
                        warn!("Namespace sweep: VDC {} failed: {}", vdc.name, e);
                    }
                }
            }
        }
        Ok(failed)
    }
}

#[cfg(test)]
#[path = "provisioner_test.rs"]
mod provisioner_test;
