//! In-process store
//!
//! Every operation takes a single lock over all tables, so each unique-key check and the
//! insert that follows it are atomic, matching the constraint behavior of [`PgStore`].
//!
//! [`PgStore`]: crate::PgStore

use crate::error::StoreError;
use crate::models::{Catalog, ClusterInstanceRef, Organization, Status, User, VApp, Vdc, Vm};
use crate::store_trait::StoreTrait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    orgs: HashMap<Uuid, Organization>,
    users: HashMap<Uuid, User>,
    vdcs: HashMap<Uuid, Vdc>,
    catalogs: HashMap<Uuid, Catalog>,
    vapps: HashMap<Uuid, VApp>,
    vms: HashMap<Uuid, Vm>,
}

/// Store backed by in-memory maps. Cloning shares the same tables.
///
/// Writes can be made to fail per operation name with [`MemoryStore::fail_on`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    failures: Arc<Mutex<HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of the write `operation` (or `ping`) fail with `Unavailable`
    pub fn fail_on(&self, operation: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(operation.to_string());
        }
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self, operation: &str) -> Result<MutexGuard<'_, Tables>, StoreError> {
        let injected = self
            .failures
            .lock()
            .map(|f| f.contains(operation))
            .unwrap_or(false);
        if injected {
            return Err(StoreError::Unavailable(format!("{}: injected failure", operation)));
        }
        self.tables()
    }
}

fn sorted_by_name<T>(mut rows: Vec<T>, name: impl Fn(&T) -> &str) -> Vec<T> {
    rows.sort_by(|a, b| name(a).cmp(name(b)));
    rows
}

#[async_trait::async_trait]
impl StoreTrait for MemoryStore {
    async fn get_org(&self, id: Uuid) -> Result<Option<Organization>, StoreError> {
        Ok(self.tables()?.orgs.get(&id).cloned())
    }

    async fn list_orgs(&self) -> Result<Vec<Organization>, StoreError> {
        let rows = self.tables()?.orgs.values().cloned().collect();
        Ok(sorted_by_name(rows, |o: &Organization| o.name.as_str()))
    }

    async fn create_org(&self, org: &Organization) -> Result<(), StoreError> {
        let mut t = self.write("create_org")?;
        if t.orgs.contains_key(&org.id) || t.orgs.values().any(|o| o.name == org.name) {
            return Err(StoreError::conflict("organization", format!("name {} already exists", org.name)));
        }
        if org.is_provider && t.orgs.values().any(|o| o.is_provider) {
            return Err(StoreError::conflict("organization", "provider organization already exists"));
        }
        t.orgs.insert(org.id, org.clone());
        Ok(())
    }

    async fn delete_org(&self, id: Uuid) -> Result<(), StoreError> {
        let mut t = self.write("delete_org")?;
        if !t.orgs.contains_key(&id) {
            return Err(StoreError::not_found("organization", id));
        }
        if t.vdcs.values().any(|v| v.org_id == id) {
            return Err(StoreError::conflict("organization", "still referenced by virtual datacenters"));
        }
        t.orgs.remove(&id);
        t.users.retain(|_, u| u.org_id != id);
        t.catalogs.retain(|_, c| c.org_id != id);
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let mut t = self.write("create_user")?;
        if !t.orgs.contains_key(&user.org_id) {
            return Err(StoreError::conflict("user", "organization does not exist"));
        }
        if t.users.values().any(|u| u.org_id == user.org_id && u.name == user.name) {
            return Err(StoreError::conflict("user", format!("name {} already exists", user.name)));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_vdc(&self, id: Uuid) -> Result<Option<Vdc>, StoreError> {
        Ok(self.tables()?.vdcs.get(&id).cloned())
    }

    async fn list_vdcs_by_org(&self, org_id: Uuid) -> Result<Vec<Vdc>, StoreError> {
        let rows = self
            .tables()?
            .vdcs
            .values()
            .filter(|v| v.org_id == org_id)
            .cloned()
            .collect();
        Ok(sorted_by_name(rows, |v: &Vdc| v.name.as_str()))
    }

    async fn create_vdc(&self, vdc: &Vdc) -> Result<(), StoreError> {
        let mut t = self.write("create_vdc")?;
        if !t.orgs.contains_key(&vdc.org_id) {
            return Err(StoreError::conflict("vdc", "organization does not exist"));
        }
        if t.vdcs.values().any(|v| v.namespace == vdc.namespace) {
            return Err(StoreError::conflict("vdc", format!("namespace {} already bound", vdc.namespace)));
        }
        if t.vdcs.values().any(|v| v.org_id == vdc.org_id && v.name == vdc.name) {
            return Err(StoreError::conflict("vdc", format!("name {} already exists", vdc.name)));
        }
        t.vdcs.insert(vdc.id, vdc.clone());
        Ok(())
    }

    async fn update_vdc(&self, vdc: &Vdc) -> Result<(), StoreError> {
        let mut t = self.write("update_vdc")?;
        if t
            .vdcs
            .values()
            .any(|v| v.id != vdc.id && v.org_id == vdc.org_id && v.name == vdc.name)
        {
            return Err(StoreError::conflict("vdc", format!("name {} already exists", vdc.name)));
        }
        let existing = t
            .vdcs
            .get_mut(&vdc.id)
            .ok_or_else(|| StoreError::not_found("vdc", vdc.id))?;
        existing.name = vdc.name.clone();
        existing.description = vdc.description.clone();
        existing.allocation_model = vdc.allocation_model;
        existing.cpu = vdc.cpu.clone();
        existing.memory = vdc.memory.clone();
        existing.network_quota = vdc.network_quota;
        existing.enabled = vdc.enabled;
        Ok(())
    }

    async fn delete_vdc(&self, id: Uuid) -> Result<(), StoreError> {
        let mut t = self.write("delete_vdc")?;
        if !t.vdcs.contains_key(&id) {
            return Err(StoreError::not_found("vdc", id));
        }
        if t.vapps.values().any(|a| a.vdc_id == id) {
            return Err(StoreError::conflict("vdc", "still referenced by vApps"));
        }
        t.vdcs.remove(&id);
        Ok(())
    }

    async fn get_catalog(&self, id: Uuid) -> Result<Option<Catalog>, StoreError> {
        Ok(self.tables()?.catalogs.get(&id).cloned())
    }

    async fn list_accessible_catalogs(&self, org_id: Uuid) -> Result<Vec<Catalog>, StoreError> {
        let rows = self
            .tables()?
            .catalogs
            .values()
            .filter(|c| c.org_id == org_id || c.published)
            .cloned()
            .collect();
        Ok(sorted_by_name(rows, |c: &Catalog| c.name.as_str()))
    }

    async fn create_catalog(&self, catalog: &Catalog) -> Result<(), StoreError> {
        let mut t = self.write("create_catalog")?;
        if !t.orgs.contains_key(&catalog.org_id) {
            return Err(StoreError::conflict("catalog", "organization does not exist"));
        }
        if t.catalogs.values().any(|c| c.org_id == catalog.org_id && c.name == catalog.name) {
            return Err(StoreError::conflict("catalog", format!("name {} already exists", catalog.name)));
        }
        t.catalogs.insert(catalog.id, catalog.clone());
        Ok(())
    }

    async fn get_vapp(&self, id: Uuid) -> Result<Option<VApp>, StoreError> {
        Ok(self.tables()?.vapps.get(&id).cloned())
    }

    async fn find_vapp_by_name(&self, vdc_id: Uuid, name: &str) -> Result<Option<VApp>, StoreError> {
        Ok(self
            .tables()?
            .vapps
            .values()
            .find(|a| a.vdc_id == vdc_id && a.name == name)
            .cloned())
    }

    async fn find_vapp_by_instance(&self, namespace: &str, instance: &str) -> Result<Option<VApp>, StoreError> {
        Ok(self
            .tables()?
            .vapps
            .values()
            .find(|a| {
                a.cluster_instance_ref
                    .as_ref()
                    .is_some_and(|r| r.namespace == namespace && r.name == instance)
            })
            .cloned())
    }

    async fn list_vapps_by_vdc(&self, vdc_id: Uuid) -> Result<Vec<VApp>, StoreError> {
        let rows = self
            .tables()?
            .vapps
            .values()
            .filter(|a| a.vdc_id == vdc_id)
            .cloned()
            .collect();
        Ok(sorted_by_name(rows, |a: &VApp| a.name.as_str()))
    }

    async fn create_vapp(&self, vapp: &VApp) -> Result<(), StoreError> {
        let mut t = self.write("create_vapp")?;
        if !t.vdcs.contains_key(&vapp.vdc_id) {
            return Err(StoreError::conflict("vapp", "virtual datacenter does not exist"));
        }
        if t.vapps.values().any(|a| a.vdc_id == vapp.vdc_id && a.name == vapp.name) {
            return Err(StoreError::conflict("vapp", format!("name {} already exists", vapp.name)));
        }
        t.vapps.insert(vapp.id, vapp.clone());
        Ok(())
    }

    async fn update_vapp_status(&self, id: Uuid, status: Status) -> Result<(), StoreError> {
        let mut t = self.write("update_vapp_status")?;
        let vapp = t.vapps.get_mut(&id).ok_or_else(|| StoreError::not_found("vapp", id))?;
        vapp.status = status;
        vapp.updated_at = Utc::now();
        Ok(())
    }

    async fn set_vapp_provenance(&self, id: Uuid, source_catalog_item: Option<&str>, instance: Option<&ClusterInstanceRef>) -> Result<(), StoreError> {
        let mut t = self.write("set_vapp_provenance")?;
        let vapp = t.vapps.get_mut(&id).ok_or_else(|| StoreError::not_found("vapp", id))?;
        vapp.source_catalog_item = source_catalog_item.map(str::to_string);
        vapp.cluster_instance_ref = instance.cloned();
        vapp.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_vapp(&self, id: Uuid) -> Result<(), StoreError> {
        let mut t = self.write("delete_vapp")?;
        if t.vapps.remove(&id).is_none() {
            return Err(StoreError::not_found("vapp", id));
        }
        t.vms.retain(|_, vm| vm.vapp_id != id);
        Ok(())
    }

    async fn get_vm(&self, id: Uuid) -> Result<Option<Vm>, StoreError> {
        Ok(self.tables()?.vms.get(&id).cloned())
    }

    async fn find_vm_by_cluster_name(&self, namespace: &str, cluster_name: &str) -> Result<Option<Vm>, StoreError> {
        Ok(self
            .tables()?
            .vms
            .values()
            .find(|vm| vm.namespace == namespace && vm.cluster_name == cluster_name)
            .cloned())
    }

    async fn list_vms_by_vapp(&self, vapp_id: Uuid) -> Result<Vec<Vm>, StoreError> {
        let rows = self
            .tables()?
            .vms
            .values()
            .filter(|vm| vm.vapp_id == vapp_id)
            .cloned()
            .collect();
        Ok(sorted_by_name(rows, |vm: &Vm| vm.name.as_str()))
    }

    async fn create_vm(&self, vm: &Vm) -> Result<(), StoreError> {
        let mut t = self.write("create_vm")?;
        if !t.vapps.contains_key(&vm.vapp_id) {
            return Err(StoreError::conflict("vm", "vApp does not exist"));
        }
        if t
            .vms
            .values()
            .any(|v| v.namespace == vm.namespace && v.cluster_name == vm.cluster_name)
        {
            return Err(StoreError::conflict("vm", format!("{}/{} already registered", vm.namespace, vm.cluster_name)));
        }
        t.vms.insert(vm.id, vm.clone());
        Ok(())
    }

    async fn update_vm_status(&self, id: Uuid, status: Status) -> Result<(), StoreError> {
        let mut t = self.write("update_vm_status")?;
        let vm = t.vms.get_mut(&id).ok_or_else(|| StoreError::not_found("vm", id))?;
        vm.status = status;
        vm.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_vm(&self, id: Uuid) -> Result<(), StoreError> {
        let mut t = self.write("delete_vm")?;
        if t.vms.remove(&id).is_none() {
            return Err(StoreError::not_found("vm", id));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.write("ping").map(|_| ())
    }
}
