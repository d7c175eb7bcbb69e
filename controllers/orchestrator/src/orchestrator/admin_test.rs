use super::*;
use crate::orchestrator::provisioner::NamespaceState;
use crate::quota::QUOTA_NAME;
use crate::test_utils::{degraded_fixture, fixture};
use cluster_client::FailureMode;
use vcd_store::{Organization, Status, StoreTrait, VApp};

fn pool(name: &str) -> VdcParams {
    VdcParams {
        allocation_model: AllocationModel::AllocationPool,
        cpu: ResourceLimit::new(2, "cores"),
        memory: ResourceLimit::new(4, "GB"),
        ..VdcParams::new(name)
    }
}

#[tokio::test]
async fn test_create_vdc_provisions_namespace() {
    let f = fixture().await;
    let vdc = f
        .orchestrator
        .create_vdc(f.sysadmin.id, &f.handle(Kind::Org, f.org.id), pool("dev"))
        .await
        .unwrap();
    assert_eq!(vdc.namespace, format!("vdc-{}", vdc.id));
    assert!(f.cluster.namespace(&vdc.namespace).is_some());
    assert!(f.cluster.resource_quota(&vdc.namespace, QUOTA_NAME).is_some());
    assert_eq!(f.store.get_vdc(vdc.id).await.unwrap(), Some(vdc.clone()));

    let provisioner = f.orchestrator.provisioner().unwrap();
    assert_eq!(provisioner.state(&vdc).await.unwrap(), NamespaceState::Managed);
}

#[tokio::test]
async fn test_create_vdc_requires_system_admin() {
    let f = fixture().await;
    let err = f
        .orchestrator
        .create_vdc(f.admin.id, &f.handle(Kind::Org, f.org.id), pool("dev"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AccessDenied(_)));
}

#[tokio::test]
async fn test_create_vdc_rejects_taken_namespace_and_name() {
    let f = fixture().await;
    let org = f.handle(Kind::Org, f.org.id);
    let mut params = pool("dev");
    params.namespace = Some(f.vdc.namespace.clone());
    let err = f
        .orchestrator
        .create_vdc(f.sysadmin.id, &org, params)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NameConflict(_)));

    let err = f
        .orchestrator
        .create_vdc(f.sysadmin.id, &org, pool(&f.vdc.name))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NameConflict(_)));

    let mut params = pool("dev");
    params.namespace = Some("Not_A_Label".to_string());
    let err = f
        .orchestrator
        .create_vdc(f.sysadmin.id, &org, params)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_create_vdc_removes_record_when_provisioning_fails() {
    let f = fixture().await;
    f.cluster.fail_on("create_namespace", FailureMode::Unavailable);
    let err = f
        .orchestrator
        .create_vdc(f.sysadmin.id, &f.handle(Kind::Org, f.org.id), pool("dev"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ClusterUnavailable(_)));
    let vdcs = f.store.list_vdcs_by_org(f.org.id).await.unwrap();
    assert_eq!(vdcs.len(), 1);
}

#[tokio::test]
async fn test_update_vdc_converges_quota_but_keeps_namespace() {
    let f = fixture().await;
    let handle = f.handle(Kind::Vdc, f.vdc.id);
    let mut params = pool(&f.vdc.name);
    params.cpu = ResourceLimit::new(16, "cores");
    let updated = f
        .orchestrator
        .update_vdc(f.sysadmin.id, &handle, params)
        .await
        .unwrap();
    assert_eq!(updated.cpu.limit, 16);
    let quota = f.cluster.resource_quota(&f.vdc.namespace, QUOTA_NAME).unwrap();
    let hard = quota.spec.unwrap().hard.unwrap();
    assert_eq!(hard.get("limits.cpu").map(|q| q.0.as_str()), Some("16"));
    assert_eq!(hard.get("limits.memory").map(|q| q.0.as_str()), Some("4Gi"));

    let mut params = pool(&f.vdc.name);
    params.namespace = Some("elsewhere".to_string());
    let err = f
        .orchestrator
        .update_vdc(f.sysadmin.id, &handle, params)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_delete_vdc_requires_it_to_be_empty() {
    let f = fixture().await;
    let handle = f.handle(Kind::Vdc, f.vdc.id);
    f.orchestrator
        .ensure_namespace(f.sysadmin.id, &handle)
        .await
        .unwrap();
    let mut vapp = VApp::new(f.vdc.id, "web");
    vapp.status = Status::Deployed;
    f.store.create_vapp(&vapp).await.unwrap();

    let err = f.orchestrator.delete_vdc(f.sysadmin.id, &handle).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ResourceConflict(_)));
    assert!(f.cluster.namespace(&f.vdc.namespace).is_some());

    f.store.delete_vapp(vapp.id).await.unwrap();
    f.orchestrator.delete_vdc(f.sysadmin.id, &handle).await.unwrap();
    assert!(f.cluster.namespace(&f.vdc.namespace).is_none());
    assert!(f.store.get_vdc(f.vdc.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_org_guards() {
    let f = fixture().await;
    let err = f
        .orchestrator
        .delete_org(f.sysadmin.id, &f.handle(Kind::Org, f.provider.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ResourceConflict(_)));

    let err = f
        .orchestrator
        .delete_org(f.sysadmin.id, &f.handle(Kind::Org, f.org.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ResourceConflict(_)));

    let empty = Organization::new("empty");
    f.store.create_org(&empty).await.unwrap();
    f.orchestrator
        .delete_org(f.sysadmin.id, &f.handle(Kind::Org, empty.id))
        .await
        .unwrap();
    assert!(f.store.get_org(empty.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_degraded_create_vdc_records_only() {
    let f = degraded_fixture().await;
    let vdc = f
        .orchestrator
        .create_vdc(f.sysadmin.id, &f.handle(Kind::Org, f.org.id), pool("dev"))
        .await
        .unwrap();
    assert!(f.store.get_vdc(vdc.id).await.unwrap().is_some());
    assert_eq!(f.cluster.mutation_count(), 0);
}
