//! PostgreSQL store
//!
//! Queries are checked at runtime (`sqlx::query_as` with bound parameters), so building
//! the crate does not need a database. Rows are fetched into `*Row` structs and mapped
//! into models; enumerations travel as text.

use crate::error::StoreError;
use crate::models::{
    AllocationModel, Catalog, ClusterInstanceRef, Organization, ResourceLimit, Role, Status,
    User, VApp, Vdc, Vm,
};
use crate::schema::SCHEMA;
use crate::store_trait::StoreTrait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

/// Store backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and apply the embedded schema
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool without touching the schema
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("schema", e))?;
        info!("Store schema applied");
        Ok(())
    }
}

fn parse<T: FromStr<Err = String>>(value: &str) -> Result<T, StoreError> {
    value.parse().map_err(StoreError::InvalidRecord)
}

#[derive(sqlx::FromRow)]
struct OrgRow {
    id: Uuid,
    name: String,
    display_name: String,
    enabled: bool,
    is_provider: bool,
    created_at: DateTime<Utc>,
}

impl From<OrgRow> for Organization {
    fn from(row: OrgRow) -> Self {
        Organization {
            id: row.id,
            name: row.name,
            display_name: row.display_name,
            enabled: row.enabled,
            is_provider: row.is_provider,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    org_id: Uuid,
    name: String,
    role: String,
    enabled: bool,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            org_id: row.org_id,
            name: row.name,
            role: parse::<Role>(&row.role)?,
            enabled: row.enabled,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VdcRow {
    id: Uuid,
    org_id: Uuid,
    name: String,
    description: Option<String>,
    allocation_model: String,
    cpu_limit: i64,
    cpu_units: String,
    memory_limit: i64,
    memory_units: String,
    network_quota: i32,
    enabled: bool,
    namespace: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<VdcRow> for Vdc {
    type Error = StoreError;

    fn try_from(row: VdcRow) -> Result<Self, Self::Error> {
        Ok(Vdc {
            id: row.id,
            org_id: row.org_id,
            name: row.name,
            description: row.description,
            allocation_model: parse::<AllocationModel>(&row.allocation_model)?,
            cpu: ResourceLimit::new(row.cpu_limit, row.cpu_units),
            memory: ResourceLimit::new(row.memory_limit, row.memory_units),
            network_quota: row.network_quota,
            enabled: row.enabled,
            namespace: row.namespace,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CatalogRow {
    id: Uuid,
    org_id: Uuid,
    name: String,
    description: Option<String>,
    published: bool,
    created_at: DateTime<Utc>,
}

impl From<CatalogRow> for Catalog {
    fn from(row: CatalogRow) -> Self {
        Catalog {
            id: row.id,
            org_id: row.org_id,
            name: row.name,
            description: row.description,
            published: row.published,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VAppRow {
    id: Uuid,
    vdc_id: Uuid,
    name: String,
    description: Option<String>,
    status: String,
    source_catalog_item: Option<String>,
    instance_namespace: Option<String>,
    instance_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VAppRow> for VApp {
    type Error = StoreError;

    fn try_from(row: VAppRow) -> Result<Self, Self::Error> {
        let cluster_instance_ref = match (row.instance_namespace, row.instance_name) {
            (Some(namespace), Some(name)) => Some(ClusterInstanceRef { namespace, name }),
            _ => None,
        };
        Ok(VApp {
            id: row.id,
            vdc_id: row.vdc_id,
            name: row.name,
            description: row.description,
            status: parse::<Status>(&row.status)?,
            source_catalog_item: row.source_catalog_item,
            cluster_instance_ref,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VmRow {
    id: Uuid,
    vapp_id: Uuid,
    name: String,
    status: String,
    cluster_name: String,
    namespace: String,
    cpu_count: Option<i32>,
    memory_mb: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VmRow> for Vm {
    type Error = StoreError;

    fn try_from(row: VmRow) -> Result<Self, Self::Error> {
        Ok(Vm {
            id: row.id,
            vapp_id: row.vapp_id,
            name: row.name,
            status: parse::<Status>(&row.status)?,
            cluster_name: row.cluster_name,
            namespace: row.namespace,
            cpu_count: row.cpu_count,
            memory_mb: row.memory_mb,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ORG_COLUMNS: &str = "id, name, display_name, enabled, is_provider, created_at";
const VDC_COLUMNS: &str = "id, org_id, name, description, allocation_model, cpu_limit, cpu_units, \
     memory_limit, memory_units, network_quota, enabled, namespace, created_at";
const CATALOG_COLUMNS: &str = "id, org_id, name, description, published, created_at";
const VAPP_COLUMNS: &str = "id, vdc_id, name, description, status, source_catalog_item, \
     instance_namespace, instance_name, created_at, updated_at";
const VM_COLUMNS: &str = "id, vapp_id, name, status, cluster_name, namespace, cpu_count, \
     memory_mb, created_at, updated_at";

/// Fail with NotFound when an UPDATE/DELETE touched nothing
fn affected(entity: &'static str, id: Uuid, rows: u64) -> Result<(), StoreError> {
    if rows == 0 {
        Err(StoreError::not_found(entity, id))
    } else {
        Ok(())
    }
}

#[async_trait::async_trait]
impl StoreTrait for PgStore {
    async fn get_org(&self, id: Uuid) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query_as::<_, OrgRow>(&format!("SELECT {} FROM organizations WHERE id = $1", ORG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("organization", e))?;
        Ok(row.map(Organization::from))
    }

    async fn list_orgs(&self) -> Result<Vec<Organization>, StoreError> {
        let rows = sqlx::query_as::<_, OrgRow>(&format!("SELECT {} FROM organizations ORDER BY name", ORG_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("organization", e))?;
        Ok(rows.into_iter().map(Organization::from).collect())
    }

    async fn create_org(&self, org: &Organization) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO organizations (id, name, display_name, enabled, is_provider, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(&org.display_name)
        .bind(org.enabled)
        .bind(org.is_provider)
        .bind(org.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("organization", e))?;
        Ok(())
    }

    async fn delete_org(&self, id: Uuid) -> Result<(), StoreError> {
        // vdcs.org_id has no ON DELETE action, so a referenced org fails with 23503
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("organization", e))?;
        affected("organization", id, result.rows_affected())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, org_id, name, role, enabled FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("user", e))?;
        row.map(User::try_from).transpose()
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (id, org_id, name, role, enabled) VALUES ($1, $2, $3, $4, $5)")
            .bind(user.id)
            .bind(user.org_id)
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(user.enabled)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("user", e))?;
        Ok(())
    }

    async fn get_vdc(&self, id: Uuid) -> Result<Option<Vdc>, StoreError> {
        let row = sqlx::query_as::<_, VdcRow>(&format!("SELECT {} FROM vdcs WHERE id = $1", VDC_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vdc", e))?;
        row.map(Vdc::try_from).transpose()
    }

    async fn list_vdcs_by_org(&self, org_id: Uuid) -> Result<Vec<Vdc>, StoreError> {
        let rows = sqlx::query_as::<_, VdcRow>(&format!("SELECT {} FROM vdcs WHERE org_id = $1 ORDER BY name", VDC_COLUMNS))
            .bind(org_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vdc", e))?;
        rows.into_iter().map(Vdc::try_from).collect()
    }

    async fn create_vdc(&self, vdc: &Vdc) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO vdcs (id, org_id, name, description, allocation_model, cpu_limit, cpu_units, \
             memory_limit, memory_units, network_quota, enabled, namespace, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(vdc.id)
        .bind(vdc.org_id)
        .bind(&vdc.name)
        .bind(&vdc.description)
        .bind(vdc.allocation_model.as_str())
        .bind(vdc.cpu.limit)
        .bind(&vdc.cpu.units)
        .bind(vdc.memory.limit)
        .bind(&vdc.memory.units)
        .bind(vdc.network_quota)
        .bind(vdc.enabled)
        .bind(&vdc.namespace)
        .bind(vdc.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("vdc", e))?;
        Ok(())
    }

    async fn update_vdc(&self, vdc: &Vdc) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE vdcs SET name = $2, description = $3, allocation_model = $4, cpu_limit = $5, \
             cpu_units = $6, memory_limit = $7, memory_units = $8, network_quota = $9, enabled = $10 \
             WHERE id = $1",
        )
        .bind(vdc.id)
        .bind(&vdc.name)
        .bind(&vdc.description)
        .bind(vdc.allocation_model.as_str())
        .bind(vdc.cpu.limit)
        .bind(&vdc.cpu.units)
        .bind(vdc.memory.limit)
        .bind(&vdc.memory.units)
        .bind(vdc.network_quota)
        .bind(vdc.enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("vdc", e))?;
        affected("vdc", vdc.id, result.rows_affected())
    }

    async fn delete_vdc(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM vdcs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vdc", e))?;
        affected("vdc", id, result.rows_affected())
    }

    async fn get_catalog(&self, id: Uuid) -> Result<Option<Catalog>, StoreError> {
        let row = sqlx::query_as::<_, CatalogRow>(&format!("SELECT {} FROM catalogs WHERE id = $1", CATALOG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("catalog", e))?;
        Ok(row.map(Catalog::from))
    }

    async fn list_accessible_catalogs(&self, org_id: Uuid) -> Result<Vec<Catalog>, StoreError> {
        let rows = sqlx::query_as::<_, CatalogRow>(&format!(
            "SELECT {} FROM catalogs WHERE org_id = $1 OR published ORDER BY name",
            CATALOG_COLUMNS
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("catalog", e))?;
        Ok(rows.into_iter().map(Catalog::from).collect())
    }

    async fn create_catalog(&self, catalog: &Catalog) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO catalogs (id, org_id, name, description, published, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(catalog.id)
        .bind(catalog.org_id)
        .bind(&catalog.name)
        .bind(&catalog.description)
        .bind(catalog.published)
        .bind(catalog.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("catalog", e))?;
        Ok(())
    }

    async fn get_vapp(&self, id: Uuid) -> Result<Option<VApp>, StoreError> {
        let row = sqlx::query_as::<_, VAppRow>(&format!("SELECT {} FROM vapps WHERE id = $1", VAPP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vapp", e))?;
        row.map(VApp::try_from).transpose()
    }

    async fn find_vapp_by_name(&self, vdc_id: Uuid, name: &str) -> Result<Option<VApp>, StoreError> {
        let row = sqlx::query_as::<_, VAppRow>(&format!("SELECT {} FROM vapps WHERE vdc_id = $1 AND name = $2", VAPP_COLUMNS))
            .bind(vdc_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vapp", e))?;
        row.map(VApp::try_from).transpose()
    }

    async fn find_vapp_by_instance(&self, namespace: &str, instance: &str) -> Result<Option<VApp>, StoreError> {
        let row = sqlx::query_as::<_, VAppRow>(&format!(
            "SELECT {} FROM vapps WHERE instance_namespace = $1 AND instance_name = $2",
            VAPP_COLUMNS
        ))
        .bind(namespace)
        .bind(instance)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("vapp", e))?;
        row.map(VApp::try_from).transpose()
    }

    async fn list_vapps_by_vdc(&self, vdc_id: Uuid) -> Result<Vec<VApp>, StoreError> {
        let rows = sqlx::query_as::<_, VAppRow>(&format!("SELECT {} FROM vapps WHERE vdc_id = $1 ORDER BY name", VAPP_COLUMNS))
            .bind(vdc_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vapp", e))?;
        rows.into_iter().map(VApp::try_from).collect()
    }

    async fn create_vapp(&self, vapp: &VApp) -> Result<(), StoreError> {
        let (instance_namespace, instance_name) = match &vapp.cluster_instance_ref {
            Some(r) => (Some(r.namespace.as_str()), Some(r.name.as_str())),
            None => (None, None),
        };
        sqlx::query(
            "INSERT INTO vapps (id, vdc_id, name, description, status, source_catalog_item, \
             instance_namespace, instance_name, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(vapp.id)
        .bind(vapp.vdc_id)
        .bind(&vapp.name)
        .bind(&vapp.description)
        .bind(vapp.status.as_str())
        .bind(&vapp.source_catalog_item)
        .bind(instance_namespace)
        .bind(instance_name)
        .bind(vapp.created_at)
        .bind(vapp.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("vapp", e))?;
        Ok(())
    }

    async fn update_vapp_status(&self, id: Uuid, status: Status) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE vapps SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vapp", e))?;
        affected("vapp", id, result.rows_affected())
    }

    async fn set_vapp_provenance(&self, id: Uuid, source_catalog_item: Option<&str>, instance: Option<&ClusterInstanceRef>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE vapps SET source_catalog_item = $2, instance_namespace = $3, instance_name = $4, \
             updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(source_catalog_item)
        .bind(instance.map(|r| r.namespace.as_str()))
        .bind(instance.map(|r| r.name.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("vapp", e))?;
        affected("vapp", id, result.rows_affected())
    }

    async fn delete_vapp(&self, id: Uuid) -> Result<(), StoreError> {
        // vms.vapp_id cascades
        let result = sqlx::query("DELETE FROM vapps WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vapp", e))?;
        affected("vapp", id, result.rows_affected())
    }

    async fn get_vm(&self, id: Uuid) -> Result<Option<Vm>, StoreError> {
        let row = sqlx::query_as::<_, VmRow>(&format!("SELECT {} FROM vms WHERE id = $1", VM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vm", e))?;
        row.map(Vm::try_from).transpose()
    }

    async fn find_vm_by_cluster_name(&self, namespace: &str, cluster_name: &str) -> Result<Option<Vm>, StoreError> {
        let row = sqlx::query_as::<_, VmRow>(&format!("SELECT {} FROM vms WHERE namespace = $1 AND cluster_name = $2", VM_COLUMNS))
            .bind(namespace)
            .bind(cluster_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vm", e))?;
        row.map(Vm::try_from).transpose()
    }

    async fn list_vms_by_vapp(&self, vapp_id: Uuid) -> Result<Vec<Vm>, StoreError> {
        let rows = sqlx::query_as::<_, VmRow>(&format!("SELECT {} FROM vms WHERE vapp_id = $1 ORDER BY name", VM_COLUMNS))
            .bind(vapp_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vm", e))?;
        rows.into_iter().map(Vm::try_from).collect()
    }

    async fn create_vm(&self, vm: &Vm) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO vms (id, vapp_id, name, status, cluster_name, namespace, cpu_count, memory_mb, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(vm.id)
        .bind(vm.vapp_id)
        .bind(&vm.name)
        .bind(vm.status.as_str())
        .bind(&vm.cluster_name)
        .bind(&vm.namespace)
        .bind(vm.cpu_count)
        .bind(vm.memory_mb)
        .bind(vm.created_at)
        .bind(vm.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("vm", e))?;
        Ok(())
    }

    async fn update_vm_status(&self, id: Uuid, status: Status) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE vms SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vm", e))?;
        affected("vm", id, result.rows_affected())
    }

    async fn delete_vm(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM vms WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("vm", e))?;
        affected("vm", id, result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("ping", e))?;
        Ok(())
    }
}
