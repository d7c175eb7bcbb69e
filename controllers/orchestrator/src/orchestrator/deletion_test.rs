use super::*;
use crate::orchestrator::InstantiateRequest;
use crate::test_utils::{degraded_fixture, fixture};
use crate::urn::CatalogItemRef;
use cluster_client::FailureMode;
use vcd_store::StoreTrait;

#[tokio::test]
async fn test_running_vms_block_delete_without_force() {
    let f = fixture().await;
    let (vapp, vm) = f.add_vapp_with_vm("web", Status::PoweredOn).await;
    let handle = f.handle(Kind::VApp, vapp.id);

    let err = f
        .orchestrator
        .delete_vapp(f.user.id, &handle, false)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::RunningVmsPresent(_)));
    assert_eq!(
        f.store.get_vapp(vapp.id).await.unwrap().unwrap().status,
        Status::PoweredOn
    );
    assert!(f.cluster.virtual_machine(&vm.namespace, &vm.cluster_name).is_some());

    f.orchestrator.delete_vapp(f.user.id, &handle, true).await.unwrap();
    assert!(f.store.get_vapp(vapp.id).await.unwrap().is_none());
    assert!(f.store.get_vm(vm.id).await.unwrap().is_none());
    assert!(f.cluster.virtual_machine(&vm.namespace, &vm.cluster_name).is_none());
}

#[tokio::test]
async fn test_delete_stopped_vapp_removes_instance() {
    let f = fixture().await;
    f.add_catalog_template("centos-web");
    let item = f.orchestrator.codec().encode_catalog_item(&CatalogItemRef::Scoped {
        catalog_id: f.catalog.id,
        name: "centos-web".to_string(),
    });
    let vapp = f
        .orchestrator
        .instantiate_template(
            f.user.id,
            InstantiateRequest {
                vdc: f.handle(Kind::Vdc, f.vdc.id),
                name: "web".to_string(),
                catalog_item: item,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let instance = vapp.cluster_instance_ref.clone().unwrap();
    assert!(f.cluster.secret(&instance.namespace, &instance.name).is_some());

    f.orchestrator
        .delete_vapp(f.user.id, &f.handle(Kind::VApp, vapp.id), false)
        .await
        .unwrap();
    assert!(f.cluster.template_instance(&instance.namespace, &instance.name).is_none());
    // Collected with its owner
    assert!(f.cluster.secret(&instance.namespace, &instance.name).is_none());
    assert!(f.store.get_vapp(vapp.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cluster_failure_restores_status() {
    let f = fixture().await;
    let (vapp, _) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    f.cluster
        .fail_on("delete_virtual_machine", FailureMode::Api("webhook denied".to_string()));

    let err = f
        .orchestrator
        .delete_vapp(f.user.id, &f.handle(Kind::VApp, vapp.id), false)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ClusterOperationFailed(_)));
    assert_eq!(
        f.store.get_vapp(vapp.id).await.unwrap().unwrap().status,
        Status::PoweredOff
    );
}

#[tokio::test]
async fn test_already_removed_cluster_objects_are_fine() {
    let f = fixture().await;
    let mut vapp = VApp::new(f.vdc.id, "ghost");
    vapp.status = Status::Deployed;
    f.store.create_vapp(&vapp).await.unwrap();
    let vm = Vm::new(vapp.id, &f.vdc.namespace, "ghost-vm", Status::PoweredOff);
    f.store.create_vm(&vm).await.unwrap();

    f.orchestrator
        .delete_vapp(f.user.id, &f.handle(Kind::VApp, vapp.id), false)
        .await
        .unwrap();
    assert!(f.store.get_vapp(vapp.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_vm_respects_force() {
    let f = fixture().await;
    let (vapp, vm) = f.add_vapp_with_vm("web", Status::PoweringOn).await;
    let handle = f.handle(Kind::Vm, vm.id);

    let err = f.orchestrator.delete_vm(f.user.id, &handle, false).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::RunningVmsPresent(_)));

    f.orchestrator.delete_vm(f.user.id, &handle, true).await.unwrap();
    assert!(f.store.get_vm(vm.id).await.unwrap().is_none());
    assert!(f.store.get_vapp(vapp.id).await.unwrap().is_some());
    assert!(f.cluster.virtual_machine(&vm.namespace, &vm.cluster_name).is_none());
}

#[tokio::test]
async fn test_delete_vm_restores_status_on_outage() {
    let f = fixture().await;
    let (_, vm) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    f.cluster.fail_on("delete_virtual_machine", FailureMode::Unavailable);

    let err = f
        .orchestrator
        .delete_vm(f.user.id, &f.handle(Kind::Vm, vm.id), false)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ClusterUnavailable(_)));
    assert_eq!(f.store.get_vm(vm.id).await.unwrap().unwrap().status, Status::PoweredOff);
}

#[tokio::test]
async fn test_read_only_and_foreign_callers_cannot_delete() {
    let f = fixture().await;
    let (vapp, _) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    let handle = f.handle(Kind::VApp, vapp.id);

    let err = f.orchestrator.delete_vapp(f.reader.id, &handle, true).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::AccessDenied(_)));
    let err = f.orchestrator.delete_vapp(f.outsider.id, &handle, true).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
    assert!(f.store.get_vapp(vapp.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_degraded_mode_deletes_record_only() {
    let f = degraded_fixture().await;
    let (vapp, _) = f.add_vapp_with_vm("web", Status::PoweredOff).await;
    f.orchestrator
        .delete_vapp(f.user.id, &f.handle(Kind::VApp, vapp.id), false)
        .await
        .unwrap();
    assert!(f.store.get_vapp(vapp.id).await.unwrap().is_none());
    assert_eq!(f.cluster.mutation_count(), 0);
}
