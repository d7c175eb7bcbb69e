//! Template operations for MockClusterClient
//!
//! Handles templates, template instances and parameter secrets

use super::{MockClusterClient, key};
use crate::cache::has_labels;
use crate::error::ClusterError;
use crds::{TemplateInstance, template_api_resource};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use std::collections::BTreeMap;

pub fn add_template(client: &MockClusterClient, namespace: &str, name: &str, labels: BTreeMap<String, String>) {
    let mut template = DynamicObject::new(name, &template_api_resource()).within(namespace);
    template.metadata.labels = Some(labels);
    template.metadata.uid = Some(client.next_uid());
    template.data = serde_json::json!({
        "objects": [{
            "apiVersion": "kubevirt.io/v1",
            "kind": "VirtualMachine",
            "metadata": {"name": "${NAME}"},
            "spec": {"runStrategy": "Halted"}
        }],
        "parameters": [{"name": "NAME", "required": true}]
    });
    client.templates.lock().unwrap().insert(key(namespace, name), template);
}

pub fn get_template(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Option<DynamicObject>, ClusterError> {
    client.check("get_template")?;
    Ok(client.templates.lock().unwrap().get(&key(namespace, name)).cloned())
}

pub fn list_templates(client: &MockClusterClient, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<DynamicObject>, ClusterError> {
    client.check("list_templates")?;
    let templates = client.templates.lock().unwrap();
    Ok(templates
        .iter()
        .filter(|((ns, _), t)| ns == namespace && has_labels(t.metadata.labels.as_ref(), labels))
        .map(|(_, t)| t.clone())
        .collect())
}

pub fn create_secret(client: &MockClusterClient, namespace: &str, secret: &Secret) -> Result<Secret, ClusterError> {
    client.check("create_secret")?;
    let name = secret.metadata.name.clone().unwrap_or_default();
    let mut secrets = client.secrets.lock().unwrap();
    if secrets.contains_key(&key(namespace, &name)) {
        return Err(ClusterError::Conflict(format!("secrets \"{}\" already exists", name)));
    }
    let mut created = secret.clone();
    created.metadata.namespace = Some(namespace.to_string());
    created.metadata.uid = Some(client.next_uid());
    secrets.insert(key(namespace, &name), created.clone());
    drop(secrets);
    client.record("create_secret", namespace, &name);
    Ok(created)
}

pub fn set_secret_owner(client: &MockClusterClient, namespace: &str, name: &str, owner: OwnerReference) -> Result<(), ClusterError> {
    client.check("set_secret_owner")?;
    let mut secrets = client.secrets.lock().unwrap();
    let secret = secrets
        .get_mut(&key(namespace, name))
        .ok_or_else(|| ClusterError::NotFound(format!("secrets \"{}\" not found", name)))?;
    secret.metadata.owner_references = Some(vec![owner]);
    drop(secrets);
    client.record("set_secret_owner", namespace, name);
    Ok(())
}

pub fn delete_secret(client: &MockClusterClient, namespace: &str, name: &str) -> Result<(), ClusterError> {
    client.check("delete_secret")?;
    if client.secrets.lock().unwrap().remove(&key(namespace, name)).is_none() {
        return Err(ClusterError::NotFound(format!("secrets \"{}\" not found", name)));
    }
    client.record("delete_secret", namespace, name);
    Ok(())
}

pub fn create_template_instance(client: &MockClusterClient, namespace: &str, instance: &TemplateInstance) -> Result<TemplateInstance, ClusterError> {
    client.check("create_template_instance")?;
    let name = instance.metadata.name.clone().unwrap_or_default();
    let mut instances = client.template_instances.lock().unwrap();
    if instances.contains_key(&key(namespace, &name)) {
        return Err(ClusterError::Conflict(format!("templateinstances \"{}\" already exists", name)));
    }
    let mut created = instance.clone();
    created.metadata.namespace = Some(namespace.to_string());
    created.metadata.uid = Some(client.next_uid());
    instances.insert(key(namespace, &name), created.clone());
    drop(instances);
    client.record("create_template_instance", namespace, &name);
    Ok(created)
}

pub fn delete_template_instance(client: &MockClusterClient, namespace: &str, name: &str) -> Result<(), ClusterError> {
    client.check("delete_template_instance")?;
    let removed = client
        .template_instances
        .lock()
        .unwrap()
        .remove(&key(namespace, name))
        .ok_or_else(|| ClusterError::NotFound(format!("templateinstances \"{}\" not found", name)))?;
    // Garbage collection of secrets owned by the instance
    if let Some(uid) = removed.metadata.uid {
        client.secrets.lock().unwrap().retain(|_, s| {
            !s.metadata
                .owner_references
                .as_ref()
                .is_some_and(|refs| refs.iter().any(|r| r.uid == uid))
        });
    }
    client.record("delete_template_instance", namespace, name);
    Ok(())
}
