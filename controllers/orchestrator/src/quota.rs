//! Desired cluster objects for a VDC namespace.
//!
//! Pure builders: the namespace metadata, the `ResourceQuota` and the optional
//! isolation `NetworkPolicy`. The provisioner compares these against what the cluster
//! holds and writes only on difference.

use crate::urn::{Kind, UrnCodec};
use crds::{
    ALLOCATION_MODEL_ANNOTATION, MANAGED_BY_LABEL, MANAGED_BY_VALUE, ORG_ID_LABEL,
    ORG_NAME_ANNOTATION, ORG_URN_ANNOTATION, VDC_ID_LABEL, VDC_NAME_ANNOTATION,
    VDC_URN_ANNOTATION, sanitize_label_value,
};
use k8s_openapi::api::core::v1::{ResourceQuota, ResourceQuotaSpec};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;
use tracing::warn;
use vcd_store::{AllocationModel, Organization, ResourceLimit, Vdc};

/// Name of the quota object in every VDC namespace
pub const QUOTA_NAME: &str = "vdc-quota";

/// Name of the isolation policy in every VDC namespace
pub const NETWORK_POLICY_NAME: &str = "vdc-isolation";

/// Object-count caps applied to every VDC
const FIXED_CAPS: [(&str, &str); 5] = [
    ("pods", "100"),
    ("persistentvolumeclaims", "50"),
    ("services", "50"),
    ("secrets", "100"),
    ("configmaps", "100"),
];

/// Labels identifying the namespace owner
pub fn namespace_labels(vdc: &Vdc, org: &Organization) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (ORG_ID_LABEL.to_string(), sanitize_label_value(&org.id.to_string())),
        (VDC_ID_LABEL.to_string(), sanitize_label_value(&vdc.id.to_string())),
    ])
}

/// Human-oriented annotations; not used for selection
pub fn namespace_annotations(vdc: &Vdc, org: &Organization, codec: &UrnCodec) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ORG_NAME_ANNOTATION.to_string(), org.name.clone()),
        (VDC_NAME_ANNOTATION.to_string(), vdc.name.clone()),
        (ORG_URN_ANNOTATION.to_string(), codec.encode_id(Kind::Org, org.id)),
        (VDC_URN_ANNOTATION.to_string(), codec.encode_id(Kind::Vdc, vdc.id)),
        (ALLOCATION_MODEL_ANNOTATION.to_string(), vdc.allocation_model.to_string()),
    ])
}

/// Convert a CPU limit to a cluster quantity
///
/// Only cores and millicores are convertible. Clock-frequency units are skipped with
/// a warning because there is no faithful mapping to CPU time.
pub fn cpu_quantity(vdc: &str, cpu: &ResourceLimit) -> Option<Quantity> {
    if cpu.is_unlimited() {
        return None;
    }
    match cpu.units.trim().to_ascii_lowercase().as_str() {
        "" | "core" | "cores" | "cpu" | "cpus" | "vcpu" | "vcpus" => Some(Quantity(cpu.limit.to_string())),
        "m" | "millicore" | "millicores" | "millicpu" => Some(Quantity(format!("{}m", cpu.limit))),
        other => {
            warn!(
                "Skipping CPU limit for VDC {}: {} {} is not expressible as cluster CPU",
                vdc, cpu.limit, other
            );
            None
        }
    }
}

/// Convert a memory limit to a cluster quantity
///
/// Unrecognized units are treated as MB, the unit VDC limits default to.
pub fn memory_quantity(vdc: &str, memory: &ResourceLimit) -> Option<Quantity> {
    if memory.is_unlimited() {
        return None;
    }
    let suffix = match memory.units.trim().to_ascii_lowercase().as_str() {
        "b" | "bytes" => "",
        "kb" | "kib" | "ki" => "Ki",
        "" | "mb" | "mib" | "mi" => "Mi",
        "gb" | "gib" | "gi" => "Gi",
        "tb" | "tib" | "ti" => "Ti",
        other => {
            warn!("Unknown memory unit '{}' for VDC {}, assuming MB", other, vdc);
            "Mi"
        }
    };
    Some(Quantity(format!("{}{}", memory.limit, suffix)))
}

/// Desired `spec.hard` for a VDC
pub fn desired_hard(vdc: &Vdc) -> BTreeMap<String, Quantity> {
    let mut hard: BTreeMap<String, Quantity> = FIXED_CAPS
        .iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect();

    let cpu = cpu_quantity(&vdc.name, &vdc.cpu);
    let memory = memory_quantity(&vdc.name, &vdc.memory);
    // Reservation pools guarantee the allocation, so requests match limits
    let reserve = vdc.allocation_model == AllocationModel::ReservationPool;

    if let Some(cpu) = cpu {
        if reserve {
            hard.insert("requests.cpu".to_string(), cpu.clone());
        }
        hard.insert("limits.cpu".to_string(), cpu);
    }
    if let Some(memory) = memory {
        if reserve {
            hard.insert("requests.memory".to_string(), memory.clone());
        }
        hard.insert("limits.memory".to_string(), memory);
    }
    hard
}

/// Desired quota object
pub fn build_quota(vdc: &Vdc, labels: &BTreeMap<String, String>) -> ResourceQuota {
    ResourceQuota {
        metadata: ObjectMeta {
            name: Some(QUOTA_NAME.to_string()),
            namespace: Some(vdc.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ResourceQuotaSpec {
            hard: Some(desired_hard(vdc)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Policy admitting ingress only from pods in the same namespace
pub fn build_network_policy(vdc: &Vdc, labels: &BTreeMap<String, String>) -> NetworkPolicy {
    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(NETWORK_POLICY_NAME.to_string()),
            namespace: Some(vdc.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            // Empty selector: every pod in the namespace
            pod_selector: Default::default(),
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    pod_selector: Some(LabelSelector::default()),
                    ..Default::default()
                }]),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn vdc(cpu: ResourceLimit, memory: ResourceLimit) -> Vdc {
        let mut vdc = Vdc::new(Uuid::new_v4(), "dev", "vdc-dev");
        vdc.cpu = cpu;
        vdc.memory = memory;
        vdc
    }

    #[test]
    fn test_fixed_caps_always_present() {
        let hard = desired_hard(&vdc(ResourceLimit::unlimited("cores"), ResourceLimit::unlimited("MB")));
        assert_eq!(hard.len(), 5);
        assert_eq!(hard["pods"], Quantity("100".to_string()));
        assert_eq!(hard["persistentvolumeclaims"], Quantity("50".to_string()));
        assert!(!hard.contains_key("limits.cpu"));
    }

    #[test]
    fn test_cpu_units() {
        assert_eq!(cpu_quantity("v", &ResourceLimit::new(4, "cores")), Some(Quantity("4".to_string())));
        assert_eq!(
            cpu_quantity("v", &ResourceLimit::new(1500, "millicores")),
            Some(Quantity("1500m".to_string()))
        );
        assert_eq!(cpu_quantity("v", &ResourceLimit::new(4000, "MHz")), None);
        assert_eq!(cpu_quantity("v", &ResourceLimit::new(2, "GHz")), None);
    }

    #[test]
    fn test_memory_units() {
        assert_eq!(
            memory_quantity("v", &ResourceLimit::new(2048, "MB")),
            Some(Quantity("2048Mi".to_string()))
        );
        assert_eq!(
            memory_quantity("v", &ResourceLimit::new(16, "GB")),
            Some(Quantity("16Gi".to_string()))
        );
        assert_eq!(memory_quantity("v", &ResourceLimit::new(0, "GB")), None);
    }

    #[test]
    fn test_clock_frequency_cpu_skipped_but_memory_kept() {
        let hard = desired_hard(&vdc(ResourceLimit::new(4000, "MHz"), ResourceLimit::new(8, "GB")));
        assert!(!hard.contains_key("limits.cpu"));
        assert_eq!(hard["limits.memory"], Quantity("8Gi".to_string()));
    }

    #[test]
    fn test_reservation_pool_sets_requests() {
        let mut vdc = vdc(ResourceLimit::new(8, "cores"), ResourceLimit::new(32, "GB"));
        vdc.allocation_model = AllocationModel::ReservationPool;
        let hard = desired_hard(&vdc);
        assert_eq!(hard["requests.cpu"], hard["limits.cpu"]);
        assert_eq!(hard["requests.memory"], Quantity("32Gi".to_string()));
    }

    #[test]
    fn test_labels_use_sanitized_uuids() {
        let org = Organization::new("acme");
        let vdc = vdc(ResourceLimit::unlimited("cores"), ResourceLimit::unlimited("MB"));
        let labels = namespace_labels(&vdc, &org);
        assert_eq!(labels[ORG_ID_LABEL], org.id.to_string());
        assert_eq!(labels[VDC_ID_LABEL], vdc.id.to_string());
        assert_eq!(labels[MANAGED_BY_LABEL], MANAGED_BY_VALUE);
    }

    #[test]
    fn test_network_policy_same_namespace_only() {
        let vdc = vdc(ResourceLimit::unlimited("cores"), ResourceLimit::unlimited("MB"));
        let policy = build_network_policy(&vdc, &BTreeMap::new());
        let spec = policy.spec.unwrap();
        let ingress = spec.ingress.unwrap();
        assert_eq!(ingress.len(), 1);
        let peer = &ingress[0].from.as_ref().unwrap()[0];
        assert!(peer.namespace_selector.is_none());
        assert!(peer.ip_block.is_none());
    }
}
