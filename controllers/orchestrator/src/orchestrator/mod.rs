//! Request-side operations of the orchestrator.
//!
//! This module is organized by concern:
//! - `access`: caller lookup and organization-scoped authorization
//! - `provisioner`: VDC namespace, quota and network policy convergence
//! - `pipeline`: catalog item instantiation into a TemplateInstance
//! - `power`: VM and vApp power operations
//! - `deletion`: vApp and VM deletion
//! - `admin`: VDC and organization administration
//! - `catalog`: catalog item listing

pub mod access;
pub mod admin;
pub mod catalog;
pub mod deletion;
pub mod pipeline;
pub mod power;
pub mod provisioner;

use crate::config::Config;
use crate::error::OrchestratorError;
use crate::urn::UrnCodec;
use cluster_client::ClusterClientTrait;
use provisioner::NamespaceProvisioner;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use vcd_store::StoreTrait;

pub use access::{Action, Resource};
pub use admin::VdcParams;
pub use catalog::{CatalogItem, Page, PageResult};
pub use pipeline::InstantiateRequest;
pub use provisioner::{EnsureOutcome, NamespaceState};

/// Serves vApp, VM, VDC and catalog operations on behalf of a caller.
///
/// The cluster client is optional: without it the orchestrator runs in degraded mode,
/// recording vApps without materializing them and refusing power operations.
pub struct Orchestrator {
    pub(crate) store: Arc<dyn StoreTrait>,
    pub(crate) cluster: Option<Arc<dyn ClusterClientTrait>>,
    pub(crate) provisioner: Option<NamespaceProvisioner>,
    pub(crate) codec: UrnCodec,
    pub(crate) template_namespace: String,
    request_timeout: Duration,
}

impl Orchestrator {
    /// Build an orchestrator; without a cluster it runs in degraded mode
    pub fn new(store: Arc<dyn StoreTrait>, cluster: Option<Arc<dyn ClusterClientTrait>>, config: &Config) -> Self {
        let codec = UrnCodec::new(config.urn_prefix.clone());
        let provisioner = cluster
            .clone()
            .map(|c| NamespaceProvisioner::new(c, codec.clone(), config.network_isolation));
        Self {
            store,
            cluster,
            provisioner,
            codec,
            template_namespace: config.template_namespace.clone(),
            request_timeout: config.request_timeout,
        }
    }

    /// Handle codec used for every request
    pub fn codec(&self) -> &UrnCodec {
        &self.codec
    }

    /// Backing relational store
    pub fn store(&self) -> &Arc<dyn StoreTrait> {
        &self.store
    }

    /// Whether a cluster backend is configured
    pub fn has_cluster(&self) -> bool {
        self.cluster.is_some()
    }

    /// Cluster client, or `ClusterUnavailable` in degraded mode
    pub(crate) fn cluster(&self) -> Result<&Arc<dyn ClusterClientTrait>, OrchestratorError> {
        self.cluster
            .as_ref()
            .ok_or_else(|| OrchestratorError::ClusterUnavailable("no cluster backend configured".to_string()))
    }

    pub(crate) fn provisioner(&self) -> Result<&NamespaceProvisioner, OrchestratorError> {
        self.provisioner
            .as_ref()
            .ok_or_else(|| OrchestratorError::ClusterUnavailable("no cluster backend configured".to_string()))
    }

    /// Run an operation under the configured request deadline
    ///
    /// On expiry the operation future is dropped. Cluster writes already acknowledged
    /// stay in place and are picked up by the next reconciliation.
    pub async fn with_deadline<T, F>(&self, operation: F) -> Result<T, OrchestratorError>
    where
        F: Future<Output = Result<T, OrchestratorError>>,
    {
        match tokio::time::timeout(self.request_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::DeadlineExceeded(self.request_timeout)),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("prefix", &self.codec.prefix())
            .field("cluster", &self.cluster.is_some())
            .field("template_namespace", &self.template_namespace)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// RFC 1123 label: lowercase alphanumerics and `-`, at most 63 characters, alphanumeric at both ends
pub(crate) fn is_dns_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixture;

    #[test]
    fn test_is_dns_label() {
        assert!(is_dns_label("web-01"));
        assert!(is_dns_label("a"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label("-web"));
        assert!(!is_dns_label("web-"));
        assert!(!is_dns_label("Web"));
        assert!(!is_dns_label("web_01"));
        assert!(!is_dns_label(&"a".repeat(64)));
    }

    #[tokio::test]
    async fn test_with_deadline_expires() {
        let f = fixture().await;
        let config = Config {
            request_timeout: Duration::from_millis(10),
            ..Config::default()
        };
        let orchestrator = Orchestrator::new(f.orchestrator.store.clone(), None, &config);
        let result: Result<(), _> = orchestrator
            .with_deadline(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(OrchestratorError::DeadlineExceeded(_))));
    }

    #[tokio::test]
    async fn test_degraded_mode_has_no_cluster() {
        let f = fixture().await;
        let orchestrator = Orchestrator::new(f.orchestrator.store.clone(), None, &Config::default());
        assert!(!orchestrator.has_cluster());
        assert!(matches!(
            orchestrator.cluster(),
            Err(OrchestratorError::ClusterUnavailable(_))
        ));
    }
}
