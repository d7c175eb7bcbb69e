//! VDC and organization administration.
//!
//! All operations require the system administrator role. VDC writes keep the bound
//! namespace converged when a cluster backend is configured.

use super::Orchestrator;
use super::access::{Action, require_system_admin};
use super::is_dns_label;
use super::provisioner::EnsureOutcome;
use crate::error::OrchestratorError;
use crate::urn::Kind;
use tracing::{error, info, warn};
use uuid::Uuid;
use vcd_store::{AllocationModel, ResourceLimit, StoreError, Vdc};

/// Attributes of a VDC
#[derive(Debug, Clone)]
pub struct VdcParams {
    /// VDC name, unique within the organization
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Quota derivation model
    pub allocation_model: AllocationModel,
    /// CPU limit
    pub cpu: ResourceLimit,
    /// Memory limit
    pub memory: ResourceLimit,
    /// Number of networks the VDC may create
    pub network_quota: i32,
    /// Disabled VDCs reject writes
    pub enabled: bool,
    /// Namespace to bind; defaults to `vdc-<uuid>`. Fixed once created.
    pub namespace: Option<String>,
}

impl VdcParams {
    /// Enabled pay-as-you-go VDC without limits
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            allocation_model: AllocationModel::PayAsYouGo,
            cpu: ResourceLimit::unlimited("cores"),
            memory: ResourceLimit::unlimited("MB"),
            network_quota: 0,
            enabled: true,
            namespace: None,
        }
    }

    fn apply(&self, vdc: &mut Vdc) {
        vdc.name = self.name.clone();
        vdc.description = self.description.clone();
        vdc.allocation_model = self.allocation_model;
        vdc.cpu = self.cpu.clone();
        vdc.memory = self.memory.clone();
        vdc.network_quota = self.network_quota;
        vdc.enabled = self.enabled;
    }
}

fn validate(params: &VdcParams) -> Result<(), OrchestratorError> {
    if params.name.trim().is_empty() {
        return Err(OrchestratorError::InvalidRequest("VDC name must not be empty".to_string()));
    }
    if let Some(ns) = &params.namespace
        && !is_dns_label(ns)
    {
        return Err(OrchestratorError::InvalidRequest(format!(
            "namespace '{}' is not a valid RFC 1123 label",
            ns
        )));
    }
    if params.network_quota < 0 {
        return Err(OrchestratorError::InvalidRequest("network quota must not be negative".to_string()));
    }
    Ok(())
}

impl Orchestrator {
    /// Create a VDC in an organization and provision its namespace
    ///
    /// The record is removed again when provisioning fails.
    pub async fn create_vdc(&self, caller_id: Uuid, org_handle: &str, params: VdcParams) -> Result<Vdc, OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        require_system_admin(&caller)?;
        validate(&params)?;
        let org_id = self.codec.decode_as(org_handle, Kind::Org)?;
        let org = self.resolve_org(&caller, org_id, Action::Write).await?;

        let id = Uuid::new_v4();
        let namespace = params
            .namespace
            .clone()
            .unwrap_or_else(|| format!("vdc-{}", id.hyphenated()));
        let mut vdc = Vdc::new(org.id, params.name.clone(), namespace);
        vdc.id = id;
        params.apply(&mut vdc);

        match self.store.create_vdc(&vdc).await {
            Ok(()) => {}
            Err(StoreError::Conflict { detail, .. }) => {
                return Err(OrchestratorError::NameConflict(format!(
                    "VDC {} conflicts with an existing VDC ({})",
                    vdc.name, detail
                )));
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(provisioner) = &self.provisioner {
            if let Err(e) = provisioner.ensure(&vdc, &org).await {
                error!("Provisioning VDC {} failed, removing record: {}", vdc.name, e);
                if let Err(cleanup) = self.store.delete_vdc(vdc.id).await {
                    error!("Failed to remove VDC record {}: {}", vdc.name, cleanup);
                }
                return Err(e);
            }
        } else {
            warn!("VDC {} recorded without a cluster backend", vdc.name);
        }
        info!("Created VDC {} in organization {} (namespace {})", vdc.name, org.name, vdc.namespace);
        Ok(vdc)
    }

    /// Update VDC attributes and converge its namespace
    pub async fn update_vdc(&self, caller_id: Uuid, vdc_handle: &str, params: VdcParams) -> Result<Vdc, OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        require_system_admin(&caller)?;
        validate(&params)?;
        let id = self.codec.decode_as(vdc_handle, Kind::Vdc)?;
        let (mut vdc, org) = self.resolve_vdc(&caller, id, Action::Write).await?;

        if let Some(ns) = &params.namespace
            && *ns != vdc.namespace
        {
            return Err(OrchestratorError::InvalidRequest(format!(
                "namespace binding of VDC {} cannot change",
                vdc.name
            )));
        }
        params.apply(&mut vdc);
        match self.store.update_vdc(&vdc).await {
            Ok(()) => {}
            Err(StoreError::Conflict { detail, .. }) => {
                return Err(OrchestratorError::NameConflict(format!("VDC {}: {}", vdc.name, detail)));
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(provisioner) = &self.provisioner {
            let outcome = provisioner.ensure(&vdc, &org).await?;
            if outcome != EnsureOutcome::Unchanged {
                info!("VDC {} namespace {:?}", vdc.name, outcome);
            }
        }
        Ok(vdc)
    }

    /// Delete an empty VDC and its namespace
    pub async fn delete_vdc(&self, caller_id: Uuid, vdc_handle: &str) -> Result<(), OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        require_system_admin(&caller)?;
        let id = self.codec.decode_as(vdc_handle, Kind::Vdc)?;
        let (vdc, _org) = self.resolve_vdc(&caller, id, Action::Write).await?;

        let vapps = self.store.list_vapps_by_vdc(vdc.id).await?;
        if !vapps.is_empty() {
            return Err(OrchestratorError::ResourceConflict(format!(
                "VDC {} still holds {} vApp(s)",
                vdc.name,
                vapps.len()
            )));
        }
        if let Some(provisioner) = &self.provisioner {
            provisioner.teardown(&vdc).await?;
        }
        match self.store.delete_vdc(vdc.id).await {
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(StoreError::Conflict { detail, .. }) => return Err(OrchestratorError::ResourceConflict(detail)),
            Err(e) => return Err(e.into()),
        }
        info!("Deleted VDC {}", vdc.name);
        Ok(())
    }

    /// Delete an organization without VDCs
    pub async fn delete_org(&self, caller_id: Uuid, org_handle: &str) -> Result<(), OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        require_system_admin(&caller)?;
        let id = self.codec.decode_as(org_handle, Kind::Org)?;
        let org = self.resolve_org(&caller, id, Action::Write).await?;

        if org.is_provider {
            return Err(OrchestratorError::ResourceConflict(
                "the provider organization cannot be deleted".to_string(),
            ));
        }
        let vdcs = self.store.list_vdcs_by_org(org.id).await?;
        if !vdcs.is_empty() {
            return Err(OrchestratorError::ResourceConflict(format!(
                "organization {} still holds {} VDC(s)",
                org.name,
                vdcs.len()
            )));
        }
        match self.store.delete_org(org.id).await {
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(StoreError::Conflict { detail, .. }) => return Err(OrchestratorError::ResourceConflict(detail)),
            Err(e) => return Err(e.into()),
        }
        info!("Deleted organization {}", org.name);
        Ok(())
    }
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod admin_test;
