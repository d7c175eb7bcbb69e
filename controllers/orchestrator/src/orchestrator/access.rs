//! Caller lookup and organization-scoped authorization.
//!
//! Every resource resolves to an owning organization by walking its parents
//! (VM to vApp to VDC to organization). Callers outside that organization get the same
//! `NotFound` as for an absent resource, so handles cannot be probed across tenants.
//! System administrators bypass the check.

use super::Orchestrator;
use crate::error::OrchestratorError;
use crate::urn::{CatalogItemRef, Kind, ResourceKey};
use tracing::{debug, warn};
use uuid::Uuid;
use vcd_store::{Catalog, Organization, Role, User, VApp, Vdc, Vm};

/// Access mode requested on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Inspect the resource
    Read,
    /// Modify, power or delete the resource
    Write,
}

/// Resource resolved from a handle, together with its parents
#[derive(Debug, Clone)]
pub enum Resource {
    /// An organization
    Org(Organization),
    /// A user with their organization
    User {
        /// The user
        user: User,
        /// Owning organization
        org: Organization,
    },
    /// A VDC with its organization
    Vdc {
        /// The VDC
        vdc: Vdc,
        /// Owning organization
        org: Organization,
    },
    /// A catalog with its organization
    Catalog {
        /// The catalog
        catalog: Catalog,
        /// Owning organization
        org: Organization,
    },
    /// Catalog items only exist in the cluster; the catalog is known for scoped handles
    CatalogItem {
        /// Decoded item reference
        item: CatalogItemRef,
        /// Catalog named by a scoped handle
        catalog: Option<Catalog>,
    },
    /// A vApp with its VDC and organization
    VApp {
        /// The vApp
        vapp: VApp,
        /// Containing VDC
        vdc: Vdc,
        /// Owning organization
        org: Organization,
    },
    /// A VM with its vApp, VDC and organization
    Vm {
        /// The VM
        vm: Vm,
        /// Containing vApp
        vapp: VApp,
        /// Containing VDC
        vdc: Vdc,
        /// Owning organization
        org: Organization,
    },
}

impl Resource {
    /// Owning organization, when the resource has one
    pub fn org(&self) -> Option<&Organization> {
        match self {
            Resource::Org(org) => Some(org),
            Resource::User { org, .. }
            | Resource::Vdc { org, .. }
            | Resource::Catalog { org, .. }
            | Resource::VApp { org, .. }
            | Resource::Vm { org, .. } => Some(org),
            Resource::CatalogItem { .. } => None,
        }
    }
}

/// Fail unless the caller is a system administrator
pub fn require_system_admin(caller: &User) -> Result<(), OrchestratorError> {
    if caller.role == Role::SystemAdmin {
        Ok(())
    } else {
        Err(OrchestratorError::AccessDenied(
            "operation requires the system administrator role".to_string(),
        ))
    }
}

impl Orchestrator {
    /// Look up the calling user
    ///
    /// Unknown and disabled users are both rejected with `AccessDenied`.
    pub async fn caller(&self, user_id: Uuid) -> Result<User, OrchestratorError> {
        match self.store.get_user(user_id).await? {
            Some(user) if user.enabled => Ok(user),
            Some(_) => Err(OrchestratorError::AccessDenied("user is disabled".to_string())),
            None => {
                debug!("Unknown caller {}", user_id);
                Err(OrchestratorError::AccessDenied("unknown user".to_string()))
            }
        }
    }

    /// Resolve any handle to its resource, enforcing access for `action`
    pub async fn resolve_access(&self, caller_id: Uuid, handle: &str, action: Action) -> Result<Resource, OrchestratorError> {
        let caller = self.caller(caller_id).await?;
        let (kind, key) = self.codec.decode(handle)?;
        match (kind, key) {
            (Kind::Org, ResourceKey::Id(id)) => Ok(Resource::Org(self.resolve_org(&caller, id, action).await?)),
            (Kind::User, ResourceKey::Id(id)) => {
                let not_found = || self.not_found(Kind::User, id);
                let user = self.store.get_user(id).await?.ok_or_else(not_found)?;
                let org = self.store.get_org(user.org_id).await?.ok_or_else(not_found)?;
                authorize(&caller, &org, action, not_found)?;
                Ok(Resource::User { user, org })
            }
            (Kind::Vdc, ResourceKey::Id(id)) => {
                let (vdc, org) = self.resolve_vdc(&caller, id, action).await?;
                Ok(Resource::Vdc { vdc, org })
            }
            (Kind::Catalog, ResourceKey::Id(id)) => {
                let catalog = self.resolve_catalog(&caller, id, action).await?;
                let org = self
                    .store
                    .get_org(catalog.org_id)
                    .await?
                    .ok_or_else(|| self.not_found(Kind::Catalog, id))?;
                Ok(Resource::Catalog { catalog, org })
            }
            (Kind::CatalogItem, ResourceKey::CatalogItem(item)) => {
                if action == Action::Write {
                    return Err(OrchestratorError::AccessDenied("catalog items are read-only".to_string()));
                }
                let catalog = match item.catalog_id() {
                    Some(catalog_id) => Some(self.resolve_catalog(&caller, catalog_id, Action::Read).await?),
                    None => {
                        self.require_any_catalog(&caller).await?;
                        None
                    }
                };
                Ok(Resource::CatalogItem { item, catalog })
            }
            (Kind::VApp, ResourceKey::Id(id)) => {
                let (vapp, vdc, org) = self.resolve_vapp(&caller, id, action).await?;
                Ok(Resource::VApp { vapp, vdc, org })
            }
            (Kind::Vm, ResourceKey::Id(id)) => {
                let (vm, vapp, vdc, org) = self.resolve_vm(&caller, id, action).await?;
                Ok(Resource::Vm { vm, vapp, vdc, org })
            }
            (kind, _) => Err(OrchestratorError::InvalidRequest(format!(
                "{} handles do not name a stored resource",
                kind
            ))),
        }
    }

    pub(crate) async fn resolve_org(&self, caller: &User, id: Uuid, action: Action) -> Result<Organization, OrchestratorError> {
        let not_found = || self.not_found(Kind::Org, id);
        let org = self.store.get_org(id).await?.ok_or_else(not_found)?;
        authorize(caller, &org, action, not_found)?;
        Ok(org)
    }

    pub(crate) async fn resolve_vdc(&self, caller: &User, id: Uuid, action: Action) -> Result<(Vdc, Organization), OrchestratorError> {
        let not_found = || self.not_found(Kind::Vdc, id);
        let vdc = self.store.get_vdc(id).await?.ok_or_else(not_found)?;
        let org = self.store.get_org(vdc.org_id).await?.ok_or_else(not_found)?;
        authorize(caller, &org, action, not_found)?;
        if action == Action::Write && !vdc.enabled && caller.role != Role::SystemAdmin {
            return Err(OrchestratorError::AccessDenied(format!("VDC {} is disabled", vdc.name)));
        }
        Ok((vdc, org))
    }

    /// Published catalogs are readable by every organization
    pub(crate) async fn resolve_catalog(&self, caller: &User, id: Uuid, action: Action) -> Result<Catalog, OrchestratorError> {
        let not_found = || self.not_found(Kind::Catalog, id);
        let catalog = self.store.get_catalog(id).await?.ok_or_else(not_found)?;
        if catalog.published && action == Action::Read {
            return Ok(catalog);
        }
        let org = self.store.get_org(catalog.org_id).await?.ok_or_else(not_found)?;
        authorize(caller, &org, action, not_found)?;
        Ok(catalog)
    }

    pub(crate) async fn resolve_vapp(
        &self,
        caller: &User,
        id: Uuid,
        action: Action,
    ) -> Result<(VApp, Vdc, Organization), OrchestratorError> {
        let not_found = || self.not_found(Kind::VApp, id);
        let vapp = self.store.get_vapp(id).await?.ok_or_else(not_found)?;
        let vdc = self.store.get_vdc(vapp.vdc_id).await?.ok_or_else(not_found)?;
        let org = self.store.get_org(vdc.org_id).await?.ok_or_else(not_found)?;
        authorize(caller, &org, action, not_found)?;
        Ok((vapp, vdc, org))
    }

    pub(crate) async fn resolve_vm(
        &self,
        caller: &User,
        id: Uuid,
        action: Action,
    ) -> Result<(Vm, VApp, Vdc, Organization), OrchestratorError> {
        let not_found = || self.not_found(Kind::Vm, id);
        let vm = self.store.get_vm(id).await?.ok_or_else(not_found)?;
        let vapp = self.store.get_vapp(vm.vapp_id).await?.ok_or_else(not_found)?;
        let vdc = self.store.get_vdc(vapp.vdc_id).await?.ok_or_else(not_found)?;
        let org = self.store.get_org(vdc.org_id).await?.ok_or_else(not_found)?;
        authorize(caller, &org, action, not_found)?;
        Ok((vm, vapp, vdc, org))
    }

    /// Coarse check for catalog items whose owning catalog is unknown
    pub(crate) async fn require_any_catalog(&self, caller: &User) -> Result<(), OrchestratorError> {
        if caller.role == Role::SystemAdmin {
            return Ok(());
        }
        if self.store.list_accessible_catalogs(caller.org_id).await?.is_empty() {
            return Err(OrchestratorError::AccessDenied("no accessible catalog".to_string()));
        }
        warn!(
            "Catalog item access for user {} checked against catalog membership only",
            caller.name
        );
        Ok(())
    }

    pub(crate) fn not_found(&self, kind: Kind, id: Uuid) -> OrchestratorError {
        OrchestratorError::NotFound(self.codec.encode_id(kind, id))
    }
}

/// Check the caller against the owning organization
///
/// Cross-organization access yields the caller-supplied `NotFound`.
fn authorize<F>(caller: &User, org: &Organization, action: Action, not_found: F) -> Result<(), OrchestratorError>
where
    F: FnOnce() -> OrchestratorError,
{
    if caller.role == Role::SystemAdmin {
        return Ok(());
    }
    if caller.org_id != org.id {
        return Err(not_found());
    }
    if !org.enabled {
        return Err(OrchestratorError::AccessDenied(format!(
            "organization {} is disabled",
            org.name
        )));
    }
    if action == Action::Write && caller.role == Role::ReadOnly {
        return Err(OrchestratorError::AccessDenied("read-only user".to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "access_test.rs"]
mod access_test;
