//! Namespace operations for MockClusterClient
//!
//! Handles namespaces, resource quotas and network policies. Deleting a namespace
//! removes every namespaced object the mock holds for it, as the cluster would.

use super::{MockClusterClient, key};
use crate::error::ClusterError;
use crate::quantity::canonical;
use k8s_openapi::api::core::v1::{Namespace, ResourceQuota};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use std::collections::BTreeMap;

pub fn get_namespace(client: &MockClusterClient, name: &str) -> Result<Option<Namespace>, ClusterError> {
    client.check("get_namespace")?;
    Ok(client.namespaces.lock().unwrap().get(name).cloned())
}

pub fn create_namespace(client: &MockClusterClient, namespace: &Namespace) -> Result<Namespace, ClusterError> {
    client.check("create_namespace")?;
    let name = namespace.metadata.name.clone().unwrap_or_default();
    let mut namespaces = client.namespaces.lock().unwrap();
    if namespaces.contains_key(&name) {
        return Err(ClusterError::Conflict(format!("namespaces \"{}\" already exists", name)));
    }
    let mut created = namespace.clone();
    created.metadata.uid = Some(client.next_uid());
    namespaces.insert(name.clone(), created.clone());
    drop(namespaces);
    client.record("create_namespace", "", &name);
    Ok(created)
}

pub fn patch_namespace_metadata(
    client: &MockClusterClient,
    name: &str,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> Result<(), ClusterError> {
    client.check("patch_namespace_metadata")?;
    let mut namespaces = client.namespaces.lock().unwrap();
    let ns = namespaces
        .get_mut(name)
        .ok_or_else(|| ClusterError::NotFound(format!("namespaces \"{}\" not found", name)))?;
    // Merge-patch semantics: keys are added or overwritten, never removed
    ns.metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(labels.clone());
    ns.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .extend(annotations.clone());
    drop(namespaces);
    client.record("patch_namespace_metadata", "", name);
    Ok(())
}

pub fn delete_namespace(client: &MockClusterClient, name: &str) -> Result<(), ClusterError> {
    client.check("delete_namespace")?;
    if client.namespaces.lock().unwrap().remove(name).is_none() {
        return Err(ClusterError::NotFound(format!("namespaces \"{}\" not found", name)));
    }
    client.quotas.lock().unwrap().retain(|(ns, _), _| ns != name);
    client.network_policies.lock().unwrap().retain(|(ns, _), _| ns != name);
    client.secrets.lock().unwrap().retain(|(ns, _), _| ns != name);
    client.template_instances.lock().unwrap().retain(|(ns, _), _| ns != name);
    client.virtual_machines.lock().unwrap().retain(|(ns, _), _| ns != name);
    client.record("delete_namespace", "", name);
    Ok(())
}

/// Stored quotas read back in the API server's canonical quantity spelling
fn canonicalized(quota: &ResourceQuota) -> ResourceQuota {
    let mut stored = quota.clone();
    if let Some(hard) = stored.spec.as_mut().and_then(|s| s.hard.as_mut()) {
        for value in hard.values_mut() {
            *value = canonical(value);
        }
    }
    stored
}

pub fn get_resource_quota(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Option<ResourceQuota>, ClusterError> {
    client.check("get_resource_quota")?;
    Ok(client.quotas.lock().unwrap().get(&key(namespace, name)).cloned())
}

pub fn create_resource_quota(client: &MockClusterClient, namespace: &str, quota: &ResourceQuota) -> Result<ResourceQuota, ClusterError> {
    client.check("create_resource_quota")?;
    if !client.namespaces.lock().unwrap().contains_key(namespace) {
        return Err(ClusterError::NotFound(format!("namespaces \"{}\" not found", namespace)));
    }
    let name = quota.metadata.name.clone().unwrap_or_default();
    let mut quotas = client.quotas.lock().unwrap();
    if quotas.contains_key(&key(namespace, &name)) {
        return Err(ClusterError::Conflict(format!("resourcequotas \"{}\" already exists", name)));
    }
    let mut created = canonicalized(quota);
    created.metadata.namespace = Some(namespace.to_string());
    created.metadata.resource_version = Some(client.next_uid());
    quotas.insert(key(namespace, &name), created.clone());
    drop(quotas);
    client.record("create_resource_quota", namespace, &name);
    Ok(created)
}

pub fn replace_resource_quota(client: &MockClusterClient, namespace: &str, quota: &ResourceQuota) -> Result<ResourceQuota, ClusterError> {
    client.check("replace_resource_quota")?;
    let name = quota.metadata.name.clone().unwrap_or_default();
    let mut quotas = client.quotas.lock().unwrap();
    if !quotas.contains_key(&key(namespace, &name)) {
        return Err(ClusterError::NotFound(format!("resourcequotas \"{}\" not found", name)));
    }
    let mut replaced = canonicalized(quota);
    replaced.metadata.namespace = Some(namespace.to_string());
    replaced.metadata.resource_version = Some(client.next_uid());
    quotas.insert(key(namespace, &name), replaced.clone());
    drop(quotas);
    client.record("replace_resource_quota", namespace, &name);
    Ok(replaced)
}

pub fn get_network_policy(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Option<NetworkPolicy>, ClusterError> {
    client.check("get_network_policy")?;
    Ok(client.network_policies.lock().unwrap().get(&key(namespace, name)).cloned())
}

pub fn apply_network_policy(client: &MockClusterClient, namespace: &str, policy: &NetworkPolicy) -> Result<(), ClusterError> {
    client.check("apply_network_policy")?;
    let name = policy.metadata.name.clone().unwrap_or_default();
    let mut applied = policy.clone();
    applied.metadata.namespace = Some(namespace.to_string());
    client.network_policies.lock().unwrap().insert(key(namespace, &name), applied);
    client.record("apply_network_policy", namespace, &name);
    Ok(())
}
