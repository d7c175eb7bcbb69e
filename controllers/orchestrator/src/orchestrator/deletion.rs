//! vApp and VM deletion.
//!
//! The record is marked `DELETING` first so concurrent power operations are rejected,
//! then the cluster objects are removed, then the record. A cluster failure restores
//! the previous status and leaves the record in place.

use super::Orchestrator;
use super::access::Action;
use crate::error::OrchestratorError;
use crate::lifecycle::is_running;
use crate::urn::Kind;
use cluster_client::{ClusterClientTrait, ClusterError};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vcd_store::{Status, StoreError, VApp, Vm};

impl Orchestrator {
    /// Delete a vApp with its VMs and TemplateInstance
    ///
    /// Without `force`, fails with `RunningVmsPresent` while any VM is running.
    pub async fn delete_vapp(&self, caller_id: Uuid, vapp_handle: &str, force: bool) -> Result<(), OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        let id = self.codec.decode_as(vapp_handle, Kind::VApp)?;
        let (vapp, _vdc, _org) = self.resolve_vapp(&caller, id, Action::Write).await?;

        let vms = self.store.list_vms_by_vapp(vapp.id).await?;
        let running = vms.iter().filter(|vm| is_running(vm.status)).count();
        if running > 0 && !force {
            return Err(OrchestratorError::RunningVmsPresent(format!(
                "vApp {} has {} running VM(s)",
                vapp.name, running
            )));
        }

        let previous = vapp.status;
        if previous != Status::Deleting {
            self.store.update_vapp_status(vapp.id, Status::Deleting).await?;
        }

        if let Some(cluster) = &self.cluster
            && let Err(e) = remove_vapp_objects(cluster, &vapp, &vms).await
        {
            self.restore_vapp_status(&vapp, previous).await;
            return Err(e);
        }

        match self.store.delete_vapp(vapp.id).await {
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        info!(
            "Deleted vApp {} ({} VMs, forced: {}) by {}",
            vapp.name,
            vms.len(),
            force,
            caller.name
        );
        Ok(())
    }

    /// Delete a single VM
    ///
    /// Without `force`, fails with `RunningVmsPresent` while the VM is running.
    pub async fn delete_vm(&self, caller_id: Uuid, vm_handle: &str, force: bool) -> Result<(), OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        let id = self.codec.decode_vm_handle(vm_handle)?;
        let (vm, _vapp, _vdc, _org) = self.resolve_vm(&caller, id, Action::Write).await?;

        if is_running(vm.status) && !force {
            return Err(OrchestratorError::RunningVmsPresent(format!(
                "VM {} is {}",
                vm.name, vm.status
            )));
        }

        let previous = vm.status;
        if previous != Status::Deleting {
            self.store.update_vm_status(vm.id, Status::Deleting).await?;
        }

        if let Some(cluster) = &self.cluster
            && let Err(e) = remove_vm(cluster, &vm).await
        {
            if previous != Status::Deleting
                && let Err(restore) = self.store.update_vm_status(vm.id, previous).await
            {
                warn!("Failed to restore status of VM {}: {}", vm.name, restore);
            }
            return Err(e);
        }

        match self.store.delete_vm(vm.id).await {
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        info!("Deleted VM {} (forced: {}) by {}", vm.name, force, caller.name);
        Ok(())
    }

    async fn restore_vapp_status(&self, vapp: &VApp, previous: Status) {
        if previous == Status::Deleting {
            return;
        }
        if let Err(e) = self.store.update_vapp_status(vapp.id, previous).await {
            warn!("Failed to restore status of vApp {}: {}", vapp.name, e);
        }
    }
}

async fn remove_vapp_objects(cluster: &Arc<dyn ClusterClientTrait>, vapp: &VApp, vms: &[Vm]) -> Result<(), OrchestratorError> {
    for vm in vms {
        remove_vm(cluster, vm).await?;
    }
    if let Some(instance) = &vapp.cluster_instance_ref {
        match cluster
            .delete_template_instance(&instance.namespace, &instance.name)
            .await
        {
            Ok(()) => debug!("Deleted template instance {}/{}", instance.namespace, instance.name),
            Err(ClusterError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn remove_vm(cluster: &Arc<dyn ClusterClientTrait>, vm: &Vm) -> Result<(), OrchestratorError> {
    match cluster
        .delete_virtual_machine(&vm.namespace, &vm.cluster_name)
        .await
    {
        Ok(()) => {
            debug!("Deleted VirtualMachine {}/{}", vm.namespace, vm.cluster_name);
            Ok(())
        }
        Err(ClusterError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "deletion_test.rs"]
mod deletion_test;
