//! Local read cache for cluster objects
//!
//! `ClusterCache` keeps reflector stores for namespaces (cluster-wide) and templates
//! (template namespace only). It is an explicit resource: the owner starts it, waits a
//! bounded time for the initial list, and stops it on shutdown. Until it has synced,
//! `ClusterClient` serves reads directly from the API server.

use crate::error::ClusterError;
use crds::template_api_resource;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::DynamicObject;
use kube::{Api, Client};
use kube_runtime::reflector::{self, ObjectRef, Store, store::Writer};
use kube_runtime::{WatchStreamExt, watcher};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reflector-backed cache of namespaces and templates
pub struct ClusterCache {
    namespaces: Store<Namespace>,
    templates: Store<DynamicObject>,
    template_namespace: String,
    synced: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ClusterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCache")
            .field("template_namespace", &self.template_namespace)
            .field("synced", &self.is_synced())
            .finish()
    }
}

impl ClusterCache {
    /// Starts the background watches. Must be called inside a Tokio runtime.
    pub fn start(client: Client, template_namespace: &str) -> Self {
        info!("Starting cluster cache (templates from namespace {})", template_namespace);

        let (namespaces, ns_writer) = reflector::store::<Namespace>();
        let ns_api: Api<Namespace> = Api::all(client.clone());
        let ns_task = tokio::spawn(async move {
            watcher(ns_api, watcher::Config::default())
                .default_backoff()
                .reflect(ns_writer)
                .applied_objects()
                .for_each(|res| async move {
                    if let Err(e) = res {
                        warn!("Namespace cache watch error: {}", e);
                    }
                })
                .await;
        });

        let ar = template_api_resource();
        let tpl_writer: Writer<DynamicObject> = Writer::new(ar.clone());
        let templates = tpl_writer.as_reader();
        let tpl_api: Api<DynamicObject> = Api::namespaced_with(client, template_namespace, &ar);
        let tpl_task = tokio::spawn(async move {
            watcher(tpl_api, watcher::Config::default())
                .default_backoff()
                .reflect(tpl_writer)
                .applied_objects()
                .for_each(|res| async move {
                    if let Err(e) = res {
                        warn!("Template cache watch error: {}", e);
                    }
                })
                .await;
        });

        Self {
            namespaces,
            templates,
            template_namespace: template_namespace.to_string(),
            synced: AtomicBool::new(false),
            tasks: Mutex::new(vec![ns_task, tpl_task]),
        }
    }

    /// Waits for the initial list of every store, bounded by `timeout`.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), ClusterError> {
        let ready = async {
            self.namespaces.wait_until_ready().await?;
            self.templates.wait_until_ready().await
        };
        match tokio::time::timeout(timeout, ready).await {
            Ok(Ok(())) => {
                self.synced.store(true, Ordering::SeqCst);
                info!("Cluster cache synced");
                Ok(())
            }
            Ok(Err(e)) => Err(ClusterError::CacheNotReady(e.to_string())),
            Err(_) => Err(ClusterError::CacheNotReady(format!(
                "initial sync did not complete within {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Stops the background watches. Reads fall back to the API server afterwards.
    pub fn stop(&self) {
        self.synced.store(false, Ordering::SeqCst);
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        info!("Cluster cache stopped");
    }

    /// Whether reads can be served from the cache
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// Namespace that templates are cached from
    pub fn template_namespace(&self) -> &str {
        &self.template_namespace
    }

    /// Cached namespace lookup
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.namespaces
            .get(&ObjectRef::new(name))
            .map(|ns| (*ns).clone())
    }

    /// Cached template lookup, `None` when `namespace` is not the cached one
    pub fn template(&self, namespace: &str, name: &str) -> Option<Option<DynamicObject>> {
        if namespace != self.template_namespace {
            debug!("Template namespace {} is not cached", namespace);
            return None;
        }
        let key = ObjectRef::new_with(name, template_api_resource()).within(namespace);
        Some(self.templates.get(&key).map(|t| (*t).clone()))
    }

    /// Cached templates carrying every label in `labels`, `None` when not cached
    pub fn templates(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Option<Vec<DynamicObject>> {
        if namespace != self.template_namespace {
            return None;
        }
        let matching = self
            .templates
            .state()
            .into_iter()
            .filter(|t| has_labels(t.metadata.labels.as_ref(), labels))
            .map(|t| (*t).clone())
            .collect();
        Some(matching)
    }
}

impl Drop for ClusterCache {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

/// Label subset match
pub(crate) fn has_labels(actual: Option<&BTreeMap<String, String>>, wanted: &BTreeMap<String, String>) -> bool {
    wanted.iter().all(|(k, v)| actual.and_then(|a| a.get(k)) == Some(v))
}

/// Renders labels as a label selector ("a=b,c=d")
pub(crate) fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
