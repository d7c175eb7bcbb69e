//! Store models
//!
//! Models mirror the relational rows. Enumerations are stored as text and parsed back
//! with `FromStr`; an unknown value read from the database is an
//! [`InvalidRecord`](crate::StoreError::InvalidRecord) error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Tenant boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    /// Short unique name
    pub name: String,
    pub display_name: String,
    pub enabled: bool,
    /// Exactly one organization is the provider org; it can never be deleted
    pub is_provider: bool,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    /// New enabled tenant organization
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            display_name: name.clone(),
            name,
            enabled: true,
            is_provider: false,
            created_at: Utc::now(),
        }
    }
}

/// Role a user holds within their organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Bypasses organization checks everywhere
    SystemAdmin,
    OrgAdmin,
    OrgUser,
    /// May read but never mutate
    ReadOnly,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SystemAdmin => "system-admin",
            Role::OrgAdmin => "org-admin",
            Role::OrgUser => "org-user",
            Role::ReadOnly => "read-only",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system-admin" => Ok(Role::SystemAdmin),
            "org-admin" => Ok(Role::OrgAdmin),
            "org-user" => Ok(Role::OrgUser),
            "read-only" => Ok(Role::ReadOnly),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Caller identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub role: Role,
    pub enabled: bool,
}

impl User {
    pub fn new(org_id: Uuid, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            name: name.into(),
            role,
            enabled: true,
        }
    }
}

/// VDC allocation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationModel {
    PayAsYouGo,
    AllocationPool,
    ReservationPool,
    Flex,
}

impl AllocationModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationModel::PayAsYouGo => "pay-as-you-go",
            AllocationModel::AllocationPool => "allocation-pool",
            AllocationModel::ReservationPool => "reservation-pool",
            AllocationModel::Flex => "flex",
        }
    }
}

impl FromStr for AllocationModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pay-as-you-go" => Ok(AllocationModel::PayAsYouGo),
            "allocation-pool" => Ok(AllocationModel::AllocationPool),
            "reservation-pool" => Ok(AllocationModel::ReservationPool),
            "flex" => Ok(AllocationModel::Flex),
            other => Err(format!("unknown allocation model: {}", other)),
        }
    }
}

impl fmt::Display for AllocationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A limit and the unit it is expressed in (e.g. `4000 MHz`, `2 cores`, `8 GB`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimit {
    /// Zero or negative means unlimited
    pub limit: i64,
    pub units: String,
}

impl ResourceLimit {
    pub fn new(limit: i64, units: impl Into<String>) -> Self {
        Self {
            limit,
            units: units.into(),
        }
    }

    pub fn unlimited(units: impl Into<String>) -> Self {
        Self::new(0, units)
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit <= 0
    }
}

/// Virtual datacenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vdc {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub allocation_model: AllocationModel,
    pub cpu: ResourceLimit,
    pub memory: ResourceLimit,
    /// Maximum networks; informational, not enforced in the cluster
    pub network_quota: i32,
    pub enabled: bool,
    /// Cluster namespace materializing this VDC. Unique, never changes after creation.
    pub namespace: String,
    pub created_at: DateTime<Utc>,
}

impl Vdc {
    /// New enabled pay-as-you-go VDC with unlimited compute
    pub fn new(org_id: Uuid, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            name: name.into(),
            description: None,
            allocation_model: AllocationModel::PayAsYouGo,
            cpu: ResourceLimit::unlimited("cores"),
            memory: ResourceLimit::unlimited("MB"),
            network_quota: 0,
            enabled: true,
            namespace: namespace.into(),
            created_at: Utc::now(),
        }
    }
}

/// Catalog of templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Published catalogs are visible to every organization
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

impl Catalog {
    pub fn new(org_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            name: name.into(),
            description: None,
            published: false,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle status shared by vApps and VMs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Instantiating,
    Deployed,
    Failed,
    PoweringOn,
    PoweredOn,
    PoweringOff,
    PoweredOff,
    Suspended,
    Deleting,
    Deleted,
    /// Placeholder written when no cluster backend is configured
    Resolved,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Instantiating => "INSTANTIATING",
            Status::Deployed => "DEPLOYED",
            Status::Failed => "FAILED",
            Status::PoweringOn => "POWERING_ON",
            Status::PoweredOn => "POWERED_ON",
            Status::PoweringOff => "POWERING_OFF",
            Status::PoweredOff => "POWERED_OFF",
            Status::Suspended => "SUSPENDED",
            Status::Deleting => "DELETING",
            Status::Deleted => "DELETED",
            Status::Resolved => "RESOLVED",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSTANTIATING" => Ok(Status::Instantiating),
            "DEPLOYED" => Ok(Status::Deployed),
            "FAILED" => Ok(Status::Failed),
            "POWERING_ON" => Ok(Status::PoweringOn),
            "POWERED_ON" => Ok(Status::PoweredOn),
            "POWERING_OFF" => Ok(Status::PoweringOff),
            "POWERED_OFF" => Ok(Status::PoweredOff),
            "SUSPENDED" => Ok(Status::Suspended),
            "DELETING" => Ok(Status::Deleting),
            "DELETED" => Ok(Status::Deleted),
            "RESOLVED" => Ok(Status::Resolved),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster object created for a vApp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInstanceRef {
    pub namespace: String,
    /// TemplateInstance name
    pub name: String,
}

/// Virtual application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VApp {
    pub id: Uuid,
    pub vdc_id: Uuid,
    /// Unique within the VDC
    pub name: String,
    pub description: Option<String>,
    pub status: Status,
    /// Catalog item handle the vApp was instantiated from
    pub source_catalog_item: Option<String>,
    pub cluster_instance_ref: Option<ClusterInstanceRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VApp {
    /// New vApp record in `INSTANTIATING`
    pub fn new(vdc_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vdc_id,
            name: name.into(),
            description: None,
            status: Status::Instantiating,
            source_catalog_item: None,
            cluster_instance_ref: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Virtual machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vm {
    pub id: Uuid,
    pub vapp_id: Uuid,
    pub name: String,
    pub status: Status,
    /// Name of the VirtualMachine custom resource
    pub cluster_name: String,
    /// Inherited from the owning VDC
    pub namespace: String,
    pub cpu_count: Option<i32>,
    pub memory_mb: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vm {
    pub fn new(vapp_id: Uuid, namespace: impl Into<String>, cluster_name: impl Into<String>, status: Status) -> Self {
        let now = Utc::now();
        let cluster_name = cluster_name.into();
        Self {
            id: Uuid::new_v4(),
            vapp_id,
            name: cluster_name.clone(),
            status,
            cluster_name,
            namespace: namespace.into(),
            cpu_count: None,
            memory_mb: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_round_trip() {
        for status in [
            Status::Instantiating,
            Status::PoweringOn,
            Status::PoweredOff,
            Status::Resolved,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert!("RUNNING".parse::<Status>().is_err());
    }

    #[test]
    fn test_allocation_model_serde_matches_text() {
        let json = serde_json::to_string(&AllocationModel::ReservationPool).unwrap();
        assert_eq!(json, "\"reservation-pool\"");
        assert_eq!(
            "pay-as-you-go".parse::<AllocationModel>().unwrap(),
            AllocationModel::PayAsYouGo
        );
    }

    #[test]
    fn test_unlimited_limit() {
        assert!(ResourceLimit::new(0, "MHz").is_unlimited());
        assert!(ResourceLimit::new(-1, "MB").is_unlimited());
        assert!(!ResourceLimit::new(2, "cores").is_unlimited());
    }

    #[test]
    fn test_new_vapp_is_instantiating() {
        let vapp = VApp::new(Uuid::new_v4(), "web");
        assert_eq!(vapp.status, Status::Instantiating);
        assert!(vapp.cluster_instance_ref.is_none());
    }
}
