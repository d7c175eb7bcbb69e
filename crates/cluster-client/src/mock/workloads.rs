//! Virtual machine operations for MockClusterClient

use super::{MockClusterClient, key};
use crate::error::ClusterError;
use crds::{RunStrategy, VirtualMachine, VirtualMachineSpec};

pub fn add_virtual_machine(client: &MockClusterClient, namespace: &str, name: &str, strategy: Option<RunStrategy>) {
    let mut vm = VirtualMachine::new(
        name,
        VirtualMachineSpec {
            run_strategy: strategy,
            ..Default::default()
        },
    );
    vm.metadata.namespace = Some(namespace.to_string());
    vm.metadata.uid = Some(client.next_uid());
    client.virtual_machines.lock().unwrap().insert(key(namespace, name), vm);
}

pub fn get_virtual_machine(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Option<VirtualMachine>, ClusterError> {
    client.check("get_virtual_machine")?;
    Ok(client.virtual_machines.lock().unwrap().get(&key(namespace, name)).cloned())
}

pub fn patch_run_strategy(client: &MockClusterClient, namespace: &str, name: &str, strategy: RunStrategy) -> Result<(), ClusterError> {
    client.check("patch_run_strategy")?;
    let mut vms = client.virtual_machines.lock().unwrap();
    let vm = vms
        .get_mut(&key(namespace, name))
        .ok_or_else(|| ClusterError::NotFound(format!("virtualmachines.kubevirt.io \"{}\" not found", name)))?;
    vm.spec.running = None;
    vm.spec.run_strategy = Some(strategy);
    drop(vms);
    client.record("patch_run_strategy", namespace, name);
    Ok(())
}

pub fn delete_virtual_machine(client: &MockClusterClient, namespace: &str, name: &str) -> Result<(), ClusterError> {
    client.check("delete_virtual_machine")?;
    if client.virtual_machines.lock().unwrap().remove(&key(namespace, name)).is_none() {
        return Err(ClusterError::NotFound(format!("virtualmachines.kubevirt.io \"{}\" not found", name)));
    }
    client.record("delete_virtual_machine", namespace, name);
    Ok(())
}
