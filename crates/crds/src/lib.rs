//! vCD Orchestrator resource definitions
//!
//! Typed views of the third-party cluster resources the orchestrator writes:
//! - `VirtualMachine` (KubeVirt, `kubevirt.io/v1`)
//! - `TemplateInstance` (OpenShift, `template.openshift.io/v1`)
//! - `Template` (OpenShift, handled as a `DynamicObject` because it has no `spec`)
//!
//! None of these CRDs are installed by this workspace; the types only mirror the
//! fields the orchestrator reads and writes.

pub mod labels;
pub mod template;
pub mod template_instance;
pub mod virtual_machine;

pub use labels::*;
pub use template::*;
pub use template_instance::*;
pub use virtual_machine::*;
