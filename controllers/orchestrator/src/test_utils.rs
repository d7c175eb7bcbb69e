//! Test utilities for unit testing the orchestrator
//!
//! [`fixture`] seeds a `MemoryStore` with two tenant organizations, one VDC and one
//! catalog each, and a user per role, and wires it to a `MockClusterClient`.

use crate::config::Config;
use crate::orchestrator::Orchestrator;
use cluster_client::{ClusterClientTrait, MockClusterClient};
use crds::{CATALOG_ID_LABEL, CATALOG_ITEM_LABEL, RunStrategy};
use std::collections::BTreeMap;
use std::sync::Arc;
use vcd_store::{
    AllocationModel, Catalog, MemoryStore, Organization, ResourceLimit, Role, Status, StoreTrait, User, VApp, Vdc, Vm,
};

/// Namespace holding catalog templates in tests
pub const TEMPLATE_NAMESPACE: &str = "openshift";

pub struct Fixture {
    pub orchestrator: Orchestrator,
    pub store: MemoryStore,
    pub cluster: MockClusterClient,
    pub provider: Organization,
    pub org: Organization,
    pub other_org: Organization,
    pub sysadmin: User,
    pub admin: User,
    pub user: User,
    pub reader: User,
    pub outsider: User,
    pub vdc: Vdc,
    pub other_vdc: Vdc,
    pub catalog: Catalog,
    pub other_catalog: Catalog,
}

/// Fixture with a mock cluster backend
pub async fn fixture() -> Fixture {
    fixture_with(Config::default(), true).await
}

/// Fixture without a cluster backend (degraded mode)
pub async fn degraded_fixture() -> Fixture {
    fixture_with(Config::default(), false).await
}

pub async fn fixture_with(mut config: Config, with_cluster: bool) -> Fixture {
    config.template_namespace = TEMPLATE_NAMESPACE.to_string();
    let store = MemoryStore::new();
    let cluster = MockClusterClient::new();

    let mut provider = Organization::new("system");
    provider.is_provider = true;
    let org = Organization::new("acme");
    let other_org = Organization::new("globex");
    for o in [&provider, &org, &other_org] {
        store.create_org(o).await.unwrap();
    }

    let sysadmin = User::new(provider.id, "root", Role::SystemAdmin);
    let admin = User::new(org.id, "alice", Role::OrgAdmin);
    let user = User::new(org.id, "bob", Role::OrgUser);
    let reader = User::new(org.id, "carol", Role::ReadOnly);
    let outsider = User::new(other_org.id, "mallory", Role::OrgAdmin);
    for u in [&sysadmin, &admin, &user, &reader, &outsider] {
        store.create_user(u).await.unwrap();
    }

    let mut vdc = Vdc::new(org.id, "acme-vdc", "vdc-acme");
    vdc.allocation_model = AllocationModel::AllocationPool;
    vdc.cpu = ResourceLimit::new(4, "cores");
    vdc.memory = ResourceLimit::new(8192, "MB");
    let other_vdc = Vdc::new(other_org.id, "globex-vdc", "vdc-globex");
    store.create_vdc(&vdc).await.unwrap();
    store.create_vdc(&other_vdc).await.unwrap();

    let catalog = Catalog::new(org.id, "acme-catalog");
    let other_catalog = Catalog::new(other_org.id, "globex-catalog");
    store.create_catalog(&catalog).await.unwrap();
    store.create_catalog(&other_catalog).await.unwrap();

    let cluster_arc: Option<Arc<dyn ClusterClientTrait>> = if with_cluster {
        Some(Arc::new(cluster.clone()))
    } else {
        None
    };
    let orchestrator = Orchestrator::new(Arc::new(store.clone()), cluster_arc, &config);

    Fixture {
        orchestrator,
        store,
        cluster,
        provider,
        org,
        other_org,
        sysadmin,
        admin,
        user,
        reader,
        outsider,
        vdc,
        other_vdc,
        catalog,
        other_catalog,
    }
}

/// Labels publishing a template as an item of `catalog`
pub fn catalog_item_labels(catalog: &Catalog) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CATALOG_ITEM_LABEL.to_string(), "true".to_string()),
        (CATALOG_ID_LABEL.to_string(), catalog.id.to_string()),
    ])
}

impl Fixture {
    /// Handle of a resource in the fixture
    pub fn handle(&self, kind: crate::urn::Kind, id: uuid::Uuid) -> String {
        self.orchestrator.codec().encode_id(kind, id)
    }

    /// Publish a template in the fixture organization's catalog
    pub fn add_catalog_template(&self, name: &str) {
        self.cluster
            .add_template(TEMPLATE_NAMESPACE, name, catalog_item_labels(&self.catalog));
    }

    /// Deployed vApp with one VM in `status`, backed by a VirtualMachine in the mock cluster
    pub async fn add_vapp_with_vm(&self, name: &str, vm_status: Status) -> (VApp, Vm) {
        let mut vapp = VApp::new(self.vdc.id, name);
        vapp.status = vm_status;
        self.store.create_vapp(&vapp).await.unwrap();

        let vm_name = format!("{}-vm", name);
        let vm = Vm::new(vapp.id, &self.vdc.namespace, &vm_name, vm_status);
        self.store.create_vm(&vm).await.unwrap();

        let strategy = match vm_status {
            Status::PoweredOn | Status::PoweringOn => RunStrategy::Always,
            _ => RunStrategy::Halted,
        };
        self.cluster
            .add_virtual_machine(&self.vdc.namespace, &vm_name, Some(strategy));
        (vapp, vm)
    }

    /// Add another VM to an existing vApp
    pub async fn add_vm(&self, vapp: &VApp, vm_name: &str, status: Status) -> Vm {
        let vm = Vm::new(vapp.id, &self.vdc.namespace, vm_name, status);
        self.store.create_vm(&vm).await.unwrap();
        self.cluster
            .add_virtual_machine(&self.vdc.namespace, vm_name, Some(RunStrategy::Halted));
        vm
    }
}
