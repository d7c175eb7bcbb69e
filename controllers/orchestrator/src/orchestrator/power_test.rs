use super::*;
use crate::test_utils::{degraded_fixture, fixture};
use cluster_client::FailureMode;
use crds::RunStrategy;
use vcd_store::StoreTrait;

fn patches(f: &crate::test_utils::Fixture) -> usize {
    f.cluster
        .mutations()
        .iter()
        .filter(|m| m.starts_with("patch_run_strategy:"))
        .count()
}

async fn stored_status(f: &crate::test_utils::Fixture, vm: &Vm) -> Status {
    f.store.get_vm(vm.id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_power_on_patches_run_strategy_and_records_pending() {
    let f = fixture().await;
    let (_, vm) = f.add_vapp_with_vm("web", Status::PoweredOff).await;

    let updated = f
        .orchestrator
        .power_on(f.user.id, &f.handle(Kind::Vm, vm.id))
        .await
        .unwrap();
    assert_eq!(updated.status, Status::PoweringOn);
    assert_eq!(stored_status(&f, &vm).await, Status::PoweringOn);

    let cluster_vm = f.cluster.virtual_machine(&vm.namespace, &vm.cluster_name).unwrap();
    assert_eq!(cluster_vm.spec.run_strategy, Some(RunStrategy::Always));
    assert_eq!(cluster_vm.spec.running, None);
}

#[tokio::test]
async fn test_double_power_on_is_rejected_without_side_effects() {
    let f = fixture().await;
    let (_, vm) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    let handle = f.handle(Kind::Vm, vm.id);
    f.orchestrator.power_on(f.user.id, &handle).await.unwrap();
    assert_eq!(patches(&f), 1);

    let err = f.orchestrator.power_on(f.user.id, &handle).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidTransition(_)));
    assert_eq!(stored_status(&f, &vm).await, Status::PoweringOn);
    assert_eq!(patches(&f), 1);
}

#[tokio::test]
async fn test_power_off_accepts_alternate_vm_encodings() {
    let f = fixture().await;
    let (_, vm) = f.add_vapp_with_vm("web", Status::PoweredOn).await;

    let hex = vm.id.simple().to_string();
    let updated = f.orchestrator.power_off(f.user.id, &hex).await.unwrap();
    assert_eq!(updated.status, Status::PoweringOff);

    let (_, vm2) = f.add_vapp_with_vm("db", Status::PoweredOn).await;
    let updated = f
        .orchestrator
        .power_off(f.user.id, &vm2.id.to_string())
        .await
        .unwrap();
    assert_eq!(updated.status, Status::PoweringOff);
    let cluster_vm = f.cluster.virtual_machine(&vm2.namespace, &vm2.cluster_name).unwrap();
    assert_eq!(cluster_vm.spec.run_strategy, Some(RunStrategy::Halted));
}

#[tokio::test]
async fn test_missing_cluster_vm_leaves_status_unchanged() {
    let f = fixture().await;
    let (vapp, _) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    let orphan = Vm::new(vapp.id, &f.vdc.namespace, "orphan", Status::PoweredOff);
    f.store.create_vm(&orphan).await.unwrap();

    let err = f
        .orchestrator
        .power_on(f.user.id, &f.handle(Kind::Vm, orphan.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ResourceNotFoundInCluster(_)));
    assert_eq!(stored_status(&f, &orphan).await, Status::PoweredOff);
}

#[tokio::test]
async fn test_cluster_outage_leaves_status_unchanged() {
    let f = fixture().await;
    let (_, vm) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    f.cluster.fail_on("patch_run_strategy", FailureMode::Unavailable);

    let err = f
        .orchestrator
        .power_on(f.user.id, &f.handle(Kind::Vm, vm.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ClusterUnavailable(_)));
    assert_eq!(stored_status(&f, &vm).await, Status::PoweredOff);
}

#[tokio::test]
async fn test_deleting_vm_conflicts() {
    let f = fixture().await;
    let (_, vm) = f.add_vapp_with_vm("web", Status::Deleting).await;
    let err = f
        .orchestrator
        .power_on(f.user.id, &f.handle(Kind::Vm, vm.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ResourceConflict(_)));
}

#[tokio::test]
async fn test_degraded_mode_refuses_power() {
    let f = degraded_fixture().await;
    let (_, vm) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    let err = f
        .orchestrator
        .power_on(f.user.id, &f.handle(Kind::Vm, vm.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ClusterUnavailable(_)));
    assert_eq!(stored_status(&f, &vm).await, Status::PoweredOff);
}

#[tokio::test]
async fn test_power_on_vapp_skips_running_vms() {
    let f = fixture().await;
    let (vapp, running) = f.add_vapp_with_vm("web", Status::PoweredOn).await;
    let stopped = f.add_vm(&vapp, "web-vm-2", Status::PoweredOff).await;

    let updated = f
        .orchestrator
        .power_on_vapp(f.user.id, &f.handle(Kind::VApp, vapp.id))
        .await
        .unwrap();
    assert_eq!(updated.status, Status::PoweringOn);
    assert_eq!(patches(&f), 1);
    assert_eq!(stored_status(&f, &running).await, Status::PoweredOn);
    assert_eq!(stored_status(&f, &stopped).await, Status::PoweringOn);
    assert_eq!(
        f.store.get_vapp(vapp.id).await.unwrap().unwrap().status,
        Status::PoweringOn
    );
}

#[tokio::test]
async fn test_power_off_vapp_with_nothing_to_stop() {
    let f = fixture().await;
    let (vapp, _) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    let err = f
        .orchestrator
        .power_off_vapp(f.user.id, &f.handle(Kind::VApp, vapp.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidTransition(_)));
    assert_eq!(patches(&f), 0);
}

#[tokio::test]
async fn test_other_org_cannot_power_vm() {
    let f = fixture().await;
    let (_, vm) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    let err = f
        .orchestrator
        .power_on(f.outsider.id, &f.handle(Kind::Vm, vm.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
    let err = f
        .orchestrator
        .power_on(f.reader.id, &f.handle(Kind::Vm, vm.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AccessDenied(_)));
}

#[tokio::test]
async fn test_vm_of_deleting_vapp_cannot_be_powered() {
    let f = fixture().await;
    let (vapp, vm) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    f.store.update_vapp_status(vapp.id, Status::Deleting).await.unwrap();

    let err = f
        .orchestrator
        .power_on(f.user.id, &f.handle(Kind::Vm, vm.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ResourceConflict(_)));
    assert_eq!(stored_status(&f, &vm).await, Status::PoweredOff);
    assert_eq!(patches(&f), 0);
}
