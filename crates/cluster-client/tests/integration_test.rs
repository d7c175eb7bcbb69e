//! Integration tests for the cluster client
//!
//! These tests require a reachable cluster (kubeconfig or in-cluster config)
//! with the OpenShift template API installed.

use cluster_client::{ClusterCache, ClusterClient, ClusterClientTrait};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
#[ignore] // Requires a running cluster
async fn test_lookup_missing_namespace() {
    let client = ClusterClient::try_default().await.expect("Failed to create client");

    let ns = client
        .get_namespace("vcd-integration-does-not-exist")
        .await
        .expect("Namespace lookup failed");
    assert!(ns.is_none());
}

#[tokio::test]
#[ignore] // Requires a running cluster with template.openshift.io
async fn test_cache_sync_and_template_listing() {
    let kube = kube::Client::try_default().await.expect("Failed to create kube client");
    let template_namespace = std::env::var("VCD_TEMPLATE_NAMESPACE")
        .unwrap_or_else(|_| "openshift".to_string());

    let cache = Arc::new(ClusterCache::start(kube.clone(), &template_namespace));
    cache
        .wait_ready(Duration::from_secs(30))
        .await
        .expect("Cache did not sync");

    let client = ClusterClient::new(kube).with_cache(cache.clone());
    let templates = client
        .list_templates(&template_namespace, &BTreeMap::new())
        .await
        .expect("Failed to list templates");
    println!("Found {} templates", templates.len());

    cache.stop();
    assert!(!cache.is_synced());
}
