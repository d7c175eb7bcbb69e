//! OpenShift TemplateInstance
//!
//! A TemplateInstance embeds the complete template body rather than referencing the
//! template by name, so edits to the source template after instantiation have no effect.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// TemplateInstanceSpec defines a materialization of a template
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "template.openshift.io",
    version = "v1",
    kind = "TemplateInstance",
    namespaced,
    status = "TemplateInstanceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInstanceSpec {
    /// Full template object
    pub template: serde_json::Value,

    /// Secret holding parameter values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<LocalSecretReference>,

    /// Identity the instance is created on behalf of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<TemplateInstanceRequester>,
}

/// Reference to a secret in the same namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct LocalSecretReference {
    /// Secret name
    pub name: String,
}

/// Requester recorded on the instance
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct TemplateInstanceRequester {
    /// User name
    pub username: String,
}

/// TemplateInstanceStatus is written by the template service broker
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInstanceStatus {
    /// Ready / InstantiateFailure conditions
    #[serde(default)]
    pub conditions: Vec<TemplateInstanceCondition>,

    /// Objects created by the instance
    #[serde(default)]
    pub objects: Vec<TemplateInstanceObject>,
}

/// Condition on a TemplateInstance
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInstanceCondition {
    /// "Ready" or "InstantiateFailure"
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    /// Machine readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Entry in `status.objects`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct TemplateInstanceObject {
    /// Reference to the created object
    #[serde(rename = "ref")]
    pub object_ref: TemplateInstanceObjectRef,
}

/// Object reference inside `status.objects`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInstanceObjectRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Outcome reported by the instance conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstancePhase {
    /// Still instantiating
    Pending,
    /// All objects created
    Ready,
    /// Instantiation failed, with message
    Failed(String),
}

impl TemplateInstanceStatus {
    /// Collapses the conditions into a single phase
    pub fn phase(&self) -> InstancePhase {
        for condition in &self.conditions {
            if condition.status != "True" {
                continue;
            }
            match condition.type_.as_str() {
                "InstantiateFailure" => {
                    return InstancePhase::Failed(condition.message.clone().unwrap_or_default());
                }
                "Ready" => return InstancePhase::Ready,
                _ => {}
            }
        }
        InstancePhase::Pending
    }

    /// VirtualMachine objects created by the instance
    pub fn virtual_machines(&self) -> impl Iterator<Item = &TemplateInstanceObjectRef> {
        self.objects
            .iter()
            .map(|o| &o.object_ref)
            .filter(|r| r.kind == "VirtualMachine")
    }
}
