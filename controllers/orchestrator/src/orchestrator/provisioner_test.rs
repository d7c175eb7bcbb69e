use super::*;
use crate::config::Config;
use crate::test_utils::{degraded_fixture, fixture, fixture_with};
use cluster_client::FailureMode;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use vcd_store::ResourceLimit;

fn hard(f: &crate::test_utils::Fixture, key: &str) -> Option<String> {
    f.cluster
        .resource_quota(&f.vdc.namespace, QUOTA_NAME)
        .and_then(|q| q.spec)
        .and_then(|s| s.hard)
        .and_then(|h| h.get(key).cloned())
        .map(|Quantity(q)| q)
}

#[tokio::test]
async fn test_ensure_creates_namespace_and_quota() {
    let f = fixture().await;
    let provisioner = f.orchestrator.provisioner().unwrap();

    let outcome = provisioner.ensure(&f.vdc, &f.org).await.unwrap();
    assert_eq!(outcome, EnsureOutcome::Created);

    let ns = f.cluster.namespace(&f.vdc.namespace).unwrap();
    let labels = ns.metadata.labels.unwrap();
    assert_eq!(labels.get(MANAGED_BY_LABEL).map(String::as_str), Some(MANAGED_BY_VALUE));
    assert_eq!(labels.get(VDC_ID_LABEL), Some(&f.vdc.id.to_string()));

    assert_eq!(hard(&f, "limits.cpu").as_deref(), Some("4"));
    // Read back in canonical form, as the API server returns it
    assert_eq!(hard(&f, "limits.memory").as_deref(), Some("8Gi"));
    assert_eq!(hard(&f, "pods").as_deref(), Some("100"));
    // Allocation pools do not reserve
    assert_eq!(hard(&f, "requests.cpu"), None);
    // Isolation is off by default
    assert!(f.cluster.network_policy(&f.vdc.namespace, NETWORK_POLICY_NAME).is_none());
}

#[tokio::test]
async fn test_ensure_is_idempotent() {
    let f = fixture().await;
    let provisioner = f.orchestrator.provisioner().unwrap();
    provisioner.ensure(&f.vdc, &f.org).await.unwrap();
    let writes = f.cluster.mutation_count();

    let outcome = provisioner.ensure(&f.vdc, &f.org).await.unwrap();
    assert_eq!(outcome, EnsureOutcome::Unchanged);
    assert_eq!(f.cluster.mutation_count(), writes);
}

#[tokio::test]
async fn test_canonical_quota_spelling_is_not_a_diff() {
    let f = fixture().await;
    let provisioner = f.orchestrator.provisioner().unwrap();
    let mut vdc = f.vdc.clone();
    vdc.cpu = ResourceLimit::new(2000, "millicores");
    vdc.memory = ResourceLimit::new(2048, "MB");
    provisioner.ensure(&vdc, &f.org).await.unwrap();
    assert_eq!(hard(&f, "limits.cpu").as_deref(), Some("2"));
    assert_eq!(hard(&f, "limits.memory").as_deref(), Some("2Gi"));
    let writes = f.cluster.mutation_count();

    assert_eq!(provisioner.ensure(&vdc, &f.org).await.unwrap(), EnsureOutcome::Unchanged);
    assert_eq!(f.cluster.mutation_count(), writes);
}

#[tokio::test]
async fn test_ensure_updates_quota_when_allocation_changes() {
    let f = fixture().await;
    let provisioner = f.orchestrator.provisioner().unwrap();
    provisioner.ensure(&f.vdc, &f.org).await.unwrap();

    let mut vdc = f.vdc.clone();
    vdc.cpu = ResourceLimit::new(8, "cores");
    vdc.allocation_model = vcd_store::AllocationModel::ReservationPool;
    let outcome = provisioner.ensure(&vdc, &f.org).await.unwrap();
    assert_eq!(outcome, EnsureOutcome::Updated);
    assert_eq!(hard(&f, "limits.cpu").as_deref(), Some("8"));
    assert_eq!(hard(&f, "requests.cpu").as_deref(), Some("8"));
}

#[tokio::test]
async fn test_quota_failure_removes_created_namespace() {
    let f = fixture().await;
    f.cluster
        .fail_on("create_resource_quota", FailureMode::Api("exceeded".to_string()));

    let err = f
        .orchestrator
        .provisioner()
        .unwrap()
        .ensure(&f.vdc, &f.org)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ClusterOperationFailed(_)));
    assert!(f.cluster.namespace(&f.vdc.namespace).is_none());
}

#[tokio::test]
async fn test_namespace_of_other_vdc_is_never_touched() {
    let f = fixture().await;
    let provisioner = f.orchestrator.provisioner().unwrap();
    provisioner.ensure(&f.vdc, &f.org).await.unwrap();
    let writes = f.cluster.mutation_count();

    // Second VDC pointing at the same namespace
    let intruder = Vdc::new(f.org.id, "intruder", f.vdc.namespace.clone());
    let err = provisioner.ensure(&intruder, &f.org).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NameConflict(_)));
    assert_eq!(f.cluster.mutation_count(), writes);

    provisioner.teardown(&intruder).await.unwrap();
    assert!(f.cluster.namespace(&f.vdc.namespace).is_some());
}

#[tokio::test]
async fn test_unmanaged_namespace_is_adopted() {
    let f = fixture().await;
    let preexisting = Namespace {
        metadata: ObjectMeta {
            name: Some(f.vdc.namespace.clone()),
            labels: Some(BTreeMap::from([("team".to_string(), "ops".to_string())])),
            ..Default::default()
        },
        ..Default::default()
    };
    f.cluster.create_namespace(&preexisting).await.unwrap();

    let provisioner = f.orchestrator.provisioner().unwrap();
    assert_eq!(provisioner.state(&f.vdc).await.unwrap(), NamespaceState::Unmanaged);
    assert_eq!(provisioner.ensure(&f.vdc, &f.org).await.unwrap(), EnsureOutcome::Adopted);
    assert_eq!(provisioner.state(&f.vdc).await.unwrap(), NamespaceState::Managed);

    let labels = f.cluster.namespace(&f.vdc.namespace).unwrap().metadata.labels.unwrap();
    assert_eq!(labels.get("team").map(String::as_str), Some("ops"));
    assert!(f.cluster.resource_quota(&f.vdc.namespace, QUOTA_NAME).is_some());
}

#[tokio::test]
async fn test_network_isolation_applies_policy_once() {
    let config = Config {
        network_isolation: true,
        ..Config::default()
    };
    let f = fixture_with(config, true).await;
    let provisioner = f.orchestrator.provisioner().unwrap();
    provisioner.ensure(&f.vdc, &f.org).await.unwrap();
    assert!(f.cluster.network_policy(&f.vdc.namespace, NETWORK_POLICY_NAME).is_some());

    let writes = f.cluster.mutation_count();
    assert_eq!(provisioner.ensure(&f.vdc, &f.org).await.unwrap(), EnsureOutcome::Unchanged);
    assert_eq!(f.cluster.mutation_count(), writes);
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let f = fixture().await;
    let provisioner = f.orchestrator.provisioner().unwrap();
    provisioner.ensure(&f.vdc, &f.org).await.unwrap();

    provisioner.teardown(&f.vdc).await.unwrap();
    assert!(f.cluster.namespace(&f.vdc.namespace).is_none());
    provisioner.teardown(&f.vdc).await.unwrap();
}

#[tokio::test]
async fn test_ensure_namespace_requires_system_admin() {
    let f = fixture().await;
    let handle = f.handle(Kind::Vdc, f.vdc.id);
    let err = f
        .orchestrator
        .ensure_namespace(f.admin.id, &handle)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AccessDenied(_)));

    let outcome = f.orchestrator.ensure_namespace(f.sysadmin.id, &handle).await.unwrap();
    assert_eq!(outcome, EnsureOutcome::Created);
    f.orchestrator.teardown_namespace(f.sysadmin.id, &handle).await.unwrap();
    assert!(f.cluster.namespace(&f.vdc.namespace).is_none());
}

#[tokio::test]
async fn test_reconcile_namespaces_sweeps_every_vdc() {
    let f = fixture().await;
    assert_eq!(f.orchestrator.reconcile_namespaces().await.unwrap(), 0);
    assert!(f.cluster.namespace(&f.vdc.namespace).is_some());
    assert!(f.cluster.namespace(&f.other_vdc.namespace).is_some());

    f.cluster.fail_on("patch_namespace_metadata", FailureMode::Unavailable);
    f.cluster.fail_on("get_resource_quota", FailureMode::Unavailable);
    assert_eq!(f.orchestrator.reconcile_namespaces().await.unwrap(), 2);
}

#[tokio::test]
async fn test_degraded_mode_cannot_provision() {
    let f = degraded_fixture().await;
    let err = f
        .orchestrator
        .ensure_namespace(f.sysadmin.id, &f.handle(Kind::Vdc, f.vdc.id))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ClusterUnavailable(_)));
}
