//! StoreTrait for mocking
//!
//! The orchestrator only talks to the relational store through this trait so that it can
//! run against [`MemoryStore`](crate::MemoryStore) in tests.

use crate::error::StoreError;
use crate::models::{Catalog, ClusterInstanceRef, Organization, Status, User, VApp, Vdc, Vm};
use uuid::Uuid;

/// Trait for relational store operations
///
/// Lookups return `Ok(None)` for absent rows; updates and deletes of absent rows return
/// `StoreError::NotFound`. Creates that violate a unique key return
/// `StoreError::Conflict`. Deletes never cascade across organization or VDC boundaries.
#[async_trait::async_trait]
pub trait StoreTrait: Send + Sync {
    // Organizations
    async fn get_org(&self, id: Uuid) -> Result<Option<Organization>, StoreError>;
    async fn list_orgs(&self) -> Result<Vec<Organization>, StoreError>;
    async fn create_org(&self, org: &Organization) -> Result<(), StoreError>;
    /// Fails with `Conflict` while any VDC still belongs to the organization
    async fn delete_org(&self, id: Uuid) -> Result<(), StoreError>;

    // Users
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    // Virtual datacenters
    async fn get_vdc(&self, id: Uuid) -> Result<Option<Vdc>, StoreError>;
    async fn list_vdcs_by_org(&self, org_id: Uuid) -> Result<Vec<Vdc>, StoreError>;
    /// Namespace binding and (org, name) must be unique
    async fn create_vdc(&self, vdc: &Vdc) -> Result<(), StoreError>;
    /// Updates mutable attributes only; the namespace binding is left untouched
    async fn update_vdc(&self, vdc: &Vdc) -> Result<(), StoreError>;
    /// Fails with `Conflict` while any vApp still belongs to the VDC
    async fn delete_vdc(&self, id: Uuid) -> Result<(), StoreError>;

    // Catalogs
    async fn get_catalog(&self, id: Uuid) -> Result<Option<Catalog>, StoreError>;
    /// Catalogs owned by the organization plus every published catalog
    async fn list_accessible_catalogs(&self, org_id: Uuid) -> Result<Vec<Catalog>, StoreError>;
    async fn create_catalog(&self, catalog: &Catalog) -> Result<(), StoreError>;

    // vApps
    async fn get_vapp(&self, id: Uuid) -> Result<Option<VApp>, StoreError>;
    async fn find_vapp_by_name(&self, vdc_id: Uuid, name: &str) -> Result<Option<VApp>, StoreError>;
    async fn find_vapp_by_instance(&self, namespace: &str, instance: &str) -> Result<Option<VApp>, StoreError>;
    async fn list_vapps_by_vdc(&self, vdc_id: Uuid) -> Result<Vec<VApp>, StoreError>;
    /// (VDC, name) must be unique
    async fn create_vapp(&self, vapp: &VApp) -> Result<(), StoreError>;
    async fn update_vapp_status(&self, id: Uuid, status: Status) -> Result<(), StoreError>;
    async fn set_vapp_provenance(&self, id: Uuid, source_catalog_item: Option<&str>, instance: Option<&ClusterInstanceRef>) -> Result<(), StoreError>;
    /// Removes the vApp and its VM rows
    async fn delete_vapp(&self, id: Uuid) -> Result<(), StoreError>;

    // VMs
    async fn get_vm(&self, id: Uuid) -> Result<Option<Vm>, StoreError>;
    async fn find_vm_by_cluster_name(&self, namespace: &str, cluster_name: &str) -> Result<Option<Vm>, StoreError>;
    async fn list_vms_by_vapp(&self, vapp_id: Uuid) -> Result<Vec<Vm>, StoreError>;
    /// (namespace, cluster name) must be unique
    async fn create_vm(&self, vm: &Vm) -> Result<(), StoreError>;
    async fn update_vm_status(&self, id: Uuid, status: Status) -> Result<(), StoreError>;
    async fn delete_vm(&self, id: Uuid) -> Result<(), StoreError>;

    /// Liveness check used by the readiness probe
    async fn ping(&self) -> Result<(), StoreError>;
}
