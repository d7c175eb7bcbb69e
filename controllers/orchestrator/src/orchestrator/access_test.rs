use super::*;
use crate::test_utils::fixture;
use vcd_store::{Status, StoreTrait};

#[tokio::test]
async fn test_cross_org_vapp_is_indistinguishable_from_absent() {
    let f = fixture().await;
    let mut foreign = VApp::new(f.other_vdc.id, "secret-app");
    foreign.status = Status::Deployed;
    f.store.create_vapp(&foreign).await.unwrap();

    let foreign_handle = f.handle(Kind::VApp, foreign.id);
    let absent_handle = f.handle(Kind::VApp, Uuid::new_v4());

    let foreign_err = f
        .orchestrator
        .resolve_access(f.admin.id, &foreign_handle, Action::Read)
        .await
        .unwrap_err();
    let absent_err = f
        .orchestrator
        .resolve_access(f.admin.id, &absent_handle, Action::Read)
        .await
        .unwrap_err();

    assert!(matches!(foreign_err, OrchestratorError::NotFound(ref h) if *h == foreign_handle));
    assert!(matches!(absent_err, OrchestratorError::NotFound(ref h) if *h == absent_handle));
    assert_eq!(foreign_err.kind(), absent_err.kind());
    assert_eq!(foreign_err.to_response().message, absent_err.to_response().message);
}

#[tokio::test]
async fn test_cross_org_vm_resolves_not_found() {
    let f = fixture().await;
    let vapp = VApp::new(f.other_vdc.id, "app");
    f.store.create_vapp(&vapp).await.unwrap();
    let vm = Vm::new(vapp.id, &f.other_vdc.namespace, "app-vm", Status::PoweredOn);
    f.store.create_vm(&vm).await.unwrap();

    let err = f
        .orchestrator
        .resolve_access(f.user.id, &f.handle(Kind::Vm, vm.id), Action::Write)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
}

#[tokio::test]
async fn test_system_admin_bypasses_org_check() {
    let f = fixture().await;
    let resource = f
        .orchestrator
        .resolve_access(f.sysadmin.id, &f.handle(Kind::Vdc, f.other_vdc.id), Action::Write)
        .await
        .unwrap();
    match resource {
        Resource::Vdc { vdc, org } => {
            assert_eq!(vdc.id, f.other_vdc.id);
            assert_eq!(org.id, f.other_org.id);
        }
        other => panic!("unexpected resource {:?}", other),
    }
}

#[tokio::test]
async fn test_read_only_user_cannot_write() {
    let f = fixture().await;
    let handle = f.handle(Kind::Vdc, f.vdc.id);
    assert!(f
        .orchestrator
        .resolve_access(f.reader.id, &handle, Action::Read)
        .await
        .is_ok());
    let err = f
        .orchestrator
        .resolve_access(f.reader.id, &handle, Action::Write)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AccessDenied(_)));
}

#[tokio::test]
async fn test_unknown_and_disabled_callers_are_denied() {
    let f = fixture().await;
    let handle = f.handle(Kind::Org, f.org.id);
    let err = f
        .orchestrator
        .resolve_access(Uuid::new_v4(), &handle, Action::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AccessDenied(_)));

    let mut disabled = User::new(f.org.id, "dave", Role::OrgAdmin);
    disabled.enabled = false;
    f.store.create_user(&disabled).await.unwrap();
    let err = f
        .orchestrator
        .resolve_access(disabled.id, &handle, Action::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AccessDenied(_)));
}

#[tokio::test]
async fn test_disabled_org_denies_members() {
    let f = fixture().await;
    let mut org = Organization::new("initech");
    org.enabled = false;
    f.store.create_org(&org).await.unwrap();
    let member = User::new(org.id, "peter", Role::OrgAdmin);
    f.store.create_user(&member).await.unwrap();

    let err = f
        .orchestrator
        .resolve_access(member.id, &f.handle(Kind::Org, org.id), Action::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AccessDenied(_)));
}

#[tokio::test]
async fn test_published_catalog_readable_across_orgs() {
    let f = fixture().await;
    let mut public = Catalog::new(f.other_org.id, "public-images");
    public.published = true;
    f.store.create_catalog(&public).await.unwrap();

    let handle = f.handle(Kind::Catalog, public.id);
    assert!(f
        .orchestrator
        .resolve_access(f.user.id, &handle, Action::Read)
        .await
        .is_ok());
    let err = f
        .orchestrator
        .resolve_access(f.user.id, &handle, Action::Write)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));

    let private = f.handle(Kind::Catalog, f.other_catalog.id);
    let err = f
        .orchestrator
        .resolve_access(f.user.id, &private, Action::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
}

#[tokio::test]
async fn test_scoped_catalog_item_checks_catalog() {
    let f = fixture().await;
    let own = f.orchestrator.codec().encode_catalog_item(&CatalogItemRef::Scoped {
        catalog_id: f.catalog.id,
        name: "centos".to_string(),
    });
    match f.orchestrator.resolve_access(f.user.id, &own, Action::Read).await.unwrap() {
        Resource::CatalogItem { catalog, .. } => assert_eq!(catalog.map(|c| c.id), Some(f.catalog.id)),
        other => panic!("unexpected resource {:?}", other),
    }

    let foreign = f.orchestrator.codec().encode_catalog_item(&CatalogItemRef::Scoped {
        catalog_id: f.other_catalog.id,
        name: "centos".to_string(),
    });
    let err = f
        .orchestrator
        .resolve_access(f.user.id, &foreign, Action::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
}

#[tokio::test]
async fn test_unresolvable_kinds_and_malformed_handles() {
    let f = fixture().await;
    let role = f.handle(Kind::Role, Uuid::new_v4());
    let err = f
        .orchestrator
        .resolve_access(f.user.id, &role, Action::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidRequest(_)));

    let err = f
        .orchestrator
        .resolve_access(f.user.id, "urn:vcloud:vapp:not-a-uuid", Action::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::MalformedHandle(_)));
}

#[test]
fn test_require_system_admin() {
    let org = Uuid::new_v4();
    assert!(require_system_admin(&User::new(org, "root", Role::SystemAdmin)).is_ok());
    assert!(matches!(
        require_system_admin(&User::new(org, "alice", Role::OrgAdmin)),
        Err(OrchestratorError::AccessDenied(_))
    ));
}
