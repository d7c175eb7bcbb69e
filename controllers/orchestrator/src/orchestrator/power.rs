//! VM and vApp power operations.
//!
//! A power operation patches `spec.runStrategy` on the VirtualMachine and records the
//! pending status (`POWERING_ON` / `POWERING_OFF`). The terminal status is written by
//! the status watcher once KubeVirt reports it. Nothing is written to the store when
//! the cluster patch fails.

use super::Orchestrator;
use super::access::Action;
use crate::error::OrchestratorError;
use crate::lifecycle::{PowerOp, guard_power};
use crate::urn::Kind;
use cluster_client::{ClusterClientTrait, ClusterError};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use vcd_store::{Status, VApp, Vm};

impl Orchestrator {
    /// Power on a VM; accepts any VM handle encoding
    pub async fn power_on(&self, caller_id: Uuid, vm_handle: &str) -> Result<Vm, OrchestratorError> {
        self.power_vm(caller_id, vm_handle, PowerOp::On).await
    }

    /// Power off a VM; accepts any VM handle encoding
    pub async fn power_off(&self, caller_id: Uuid, vm_handle: &str) -> Result<Vm, OrchestratorError> {
        self.power_vm(caller_id, vm_handle, PowerOp::Off).await
    }

    /// Power on every VM of a vApp that is not already on
    pub async fn power_on_vapp(&self, caller_id: Uuid, vapp_handle: &str) -> Result<VApp, OrchestratorError> {
        self.power_vapp(caller_id, vapp_handle, PowerOp::On).await
    }

    /// Power off every VM of a vApp that is not already off
    pub async fn power_off_vapp(&self, caller_id: Uuid, vapp_handle: &str) -> Result<VApp, OrchestratorError> {
        self.power_vapp(caller_id, vapp_handle, PowerOp::Off).await
    }

    async fn power_vm(&self, caller_id: Uuid, vm_handle: &str, op: PowerOp) -> Result<Vm, OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        let id = self.codec.decode_vm_handle(vm_handle)?;
        let (mut vm, vapp, _vdc, _org) = self.resolve_vm(&caller, id, Action::Write).await?;

        if matches!(vapp.status, Status::Deleting | Status::Deleted) {
            return Err(OrchestratorError::ResourceConflict(format!(
                "cannot {} VM {} while vApp {} is {}",
                op.as_str(),
                vm.name,
                vapp.name,
                vapp.status
            )));
        }
        let pending = guard_power(vm.status, op)?;
        let cluster = self.cluster()?;
        patch_power(cluster, &vm, op).await?;
        self.store.update_vm_status(vm.id, pending).await?;

        info!("{} requested for VM {} by {}", op.as_str(), vm.name, caller.name);
        vm.status = pending;
        Ok(vm)
    }

    async fn power_vapp(&self, caller_id: Uuid, vapp_handle: &str, op: PowerOp) -> Result<VApp, OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        let id = self.codec.decode_as(vapp_handle, Kind::VApp)?;
        let (mut vapp, _vdc, _org) = self.resolve_vapp(&caller, id, Action::Write).await?;

        let pending = guard_vapp(&vapp, op)?;
        let mut targets = Vec::new();
        for vm in self.store.list_vms_by_vapp(vapp.id).await? {
            match guard_power(vm.status, op) {
                Ok(_) => targets.push(vm),
                Err(OrchestratorError::InvalidTransition(reason)) => {
                    debug!("Skipping VM {}: {}", vm.name, reason);
                }
                Err(e) => return Err(e),
            }
        }
        if targets.is_empty() {
            return Err(OrchestratorError::InvalidTransition(format!(
                "no VM in vApp {} can {}",
                vapp.name,
                op.as_str()
            )));
        }

        let cluster = self.cluster()?;
        for vm in &targets {
            patch_power(cluster, vm, op).await?;
            self.store.update_vm_status(vm.id, pending).await?;
        }
        self.store.update_vapp_status(vapp.id, pending).await?;

        info!(
            "{} requested for vApp {} ({} VMs) by {}",
            op.as_str(),
            vapp.name,
            targets.len(),
            caller.name
        );
        vapp.status = pending;
        Ok(vapp)
    }
}

async fn patch_power(cluster: &Arc<dyn ClusterClientTrait>, vm: &Vm, op: PowerOp) -> Result<(), OrchestratorError> {
    match cluster
        .patch_run_strategy(&vm.namespace, &vm.cluster_name, op.run_strategy())
        .await
    {
        Ok(()) => Ok(()),
        Err(ClusterError::NotFound(_)) => Err(OrchestratorError::ResourceNotFoundInCluster(format!(
            "VirtualMachine {}/{}",
            vm.namespace, vm.cluster_name
        ))),
        Err(e) => Err(e.into()),
    }
}

/// vApp-level guard; power states are checked per VM since the vApp only aggregates them
fn guard_vapp(vapp: &VApp, op: PowerOp) -> Result<Status, OrchestratorError> {
    match vapp.status {
        Status::Deleting | Status::Deleted | Status::Instantiating | Status::Resolved => guard_power(vapp.status, op),
        _ => Ok(op.pending_status()),
    }
}

#[cfg(test)]
#[path = "power_test.rs"]
mod power_test;
