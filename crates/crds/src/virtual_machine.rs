//! KubeVirt VirtualMachine
//!
//! Only `spec.runStrategy` is written by the orchestrator. The rest of the spec is
//! carried opaquely so that objects created from templates round-trip untouched.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// VirtualMachineSpec mirrors the subset of `kubevirt.io/v1` the orchestrator touches
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "kubevirt.io",
    version = "v1",
    kind = "VirtualMachine",
    namespaced,
    status = "VirtualMachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    /// Run strategy governing whether the VMI should exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_strategy: Option<RunStrategy>,

    /// Deprecated boolean form of the run strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,

    /// VMI template, passed through as-is
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub template: serde_json::Value,
}

/// KubeVirt run strategies
///
/// Serialized exactly as KubeVirt expects ("Always", "Halted", ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum RunStrategy {
    /// VMI is kept running
    Always,
    /// VMI is stopped
    Halted,
    /// Started and stopped only by explicit subresource calls
    Manual,
    /// Restarted only when it fails
    RerunOnFailure,
    /// Run once, not restarted
    Once,
}

impl RunStrategy {
    /// String form used in merge patches
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStrategy::Always => "Always",
            RunStrategy::Halted => "Halted",
            RunStrategy::Manual => "Manual",
            RunStrategy::RerunOnFailure => "RerunOnFailure",
            RunStrategy::Once => "Once",
        }
    }
}

/// VirtualMachineStatus is written by KubeVirt, read by the status watcher
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineStatus {
    /// Human readable phase ("Running", "Stopped", "Starting", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printable_status: Option<String>,

    /// Whether the VMI is ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,

    /// Whether the VMI has been created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_kubevirt_vm() {
        let yaml = r#"
apiVersion: kubevirt.io/v1
kind: VirtualMachine
metadata:
  name: web-0
  namespace: vdc-a
spec:
  runStrategy: Halted
  template:
    spec:
      domain:
        cpu:
          cores: 2
status:
  printableStatus: Stopped
  ready: false
"#;
        let vm: VirtualMachine = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(vm.spec.run_strategy, Some(RunStrategy::Halted));
        assert_eq!(
            vm.status.as_ref().and_then(|s| s.printable_status.as_deref()),
            Some("Stopped")
        );
        assert_eq!(vm.spec.template["spec"]["domain"]["cpu"]["cores"], 2);
    }

    #[test]
    fn test_run_strategy_serializes_pascal_case() {
        let json = serde_json::to_value(RunStrategy::RerunOnFailure).unwrap();
        assert_eq!(json, serde_json::json!("RerunOnFailure"));
        assert_eq!(RunStrategy::Always.as_str(), "Always");
    }
}
