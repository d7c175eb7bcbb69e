//! vCD Orchestrator
//!
//! Serves a vCloud-style VDC API on top of Kubernetes:
//! - organizations and VDCs map to labeled namespaces with a `ResourceQuota`
//! - catalog items are OpenShift `Template`s published with catalog labels
//! - vApps are `TemplateInstance`s, VMs are KubeVirt `VirtualMachine`s
//!
//! Tenant-visible identity lives in the relational store (`vcd-store`). Request
//! handlers in [`orchestrator`] write pending statuses; the [`watcher`] module writes
//! the terminal ones once the cluster confirms them.

pub mod backoff;
pub mod config;
pub mod controller;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod probes;
pub mod quota;
pub mod urn;
pub mod watcher;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use controller::Controller;
pub use error::{ErrorKind, ErrorResponse, OrchestratorError};
pub use orchestrator::Orchestrator;
