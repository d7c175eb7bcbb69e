//! Kubernetes cluster client
//!
//! Cluster-facing operations used by the vCD orchestrator: namespaces, resource quotas,
//! network policies, OpenShift templates and template instances, parameter secrets and
//! KubeVirt virtual machines.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterCache, ClusterClient, ClusterClientTrait};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//!
//! // Read paths are served from the cache once it has synced
//! let cache = Arc::new(ClusterCache::start(client.clone(), "openshift"));
//! cache.wait_ready(Duration::from_secs(30)).await?;
//!
//! let cluster = ClusterClient::new(client).with_cache(cache.clone());
//! let ns = cluster.get_namespace("vdc-3f2b8c1e").await?;
//!
//! cache.stop();
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Cached reads**: namespace and template lookups go through reflector stores
//! - **Direct writes**: every create/update/delete/patch is sent to the API server
//! - **Normalized errors**: 404/409 and transport failures map to dedicated variants
//! - **Quantity comparison**: `quantity` compares quotas by value, not spelling
//! - **Mocking**: `MockClusterClient` behind the `test-util` feature

pub mod cache;
pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;
pub mod quantity;

pub use cache::ClusterCache;
pub use client::ClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
#[cfg(feature = "test-util")]
pub use mock::{FailureMode, MockClusterClient};
