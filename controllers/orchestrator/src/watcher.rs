//! Cluster status watchers.
//!
//! Request handlers only write pending statuses. The watchers here observe
//! VirtualMachine and TemplateInstance resources and write the terminal statuses back
//! to the store once the cluster confirms them, using `lifecycle::observe` so stale or
//! out-of-order events never move a record backwards.
//!
//! Both watchers run through a generic `watch_resource()` helper built on
//! kube_runtime::Controller, which handles reconnection and requeueing.

use crate::backoff::FibonacciBackoff;
use crate::error::OrchestratorError;
use crate::lifecycle::observe;
use cluster_client::ClusterClientTrait;
use crds::{InstancePhase, MANAGED_BY_LABEL, MANAGED_BY_VALUE, TEMPLATE_INSTANCE_OWNER_LABEL, TemplateInstance, VirtualMachine};
use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{
    Controller, watcher,
    controller::{Action, Config as ControllerConfig},
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vcd_store::{Status, StoreError, StoreTrait, VApp, Vm};

const MIN_REQUEUE: Duration = Duration::from_secs(5);
const MAX_REQUEUE: Duration = Duration::from_secs(120);

/// Printable statuses KubeVirt reports for a VM that cannot run
const FAILED_PRINTABLE_STATUSES: &[&str] = &[
    "CrashLoopBackOff",
    "ErrorUnschedulable",
    "ErrImagePull",
    "ImagePullBackOff",
    "ErrorPvcNotFound",
    "ErrorDataVolumeNotFound",
    "DataVolumeError",
];

/// Lifecycle status reported by a VirtualMachine, if it maps to one
pub fn observed_vm_status(vm: &VirtualMachine) -> Option<Status> {
    let printable = vm.status.as_ref()?.printable_status.as_deref()?;
    match printable {
        "Running" => Some(Status::PoweredOn),
        "Stopped" => Some(Status::PoweredOff),
        "Paused" => Some(Status::Suspended),
        "Starting" => Some(Status::PoweringOn),
        "Stopping" => Some(Status::PoweringOff),
        s if FAILED_PRINTABLE_STATUSES.contains(&s) => Some(Status::Failed),
        _ => None,
    }
}

/// Backoff state for tracking retry delays per resource
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(MIN_REQUEUE, MAX_REQUEUE),
            error_count: 0,
        }
    }
}

/// Writes cluster-observed statuses back to the store.
pub struct StatusReconciler {
    pub(crate) store: Arc<dyn StoreTrait>,
    pub(crate) cluster: Arc<dyn ClusterClientTrait>,
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for StatusReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReconciler").finish_non_exhaustive()
    }
}

impl StatusReconciler {
    /// Reconciler writing to `store`, reading VMs from `cluster`
    pub fn new(store: Arc<dyn StoreTrait>, cluster: Arc<dyn ClusterClientTrait>) -> Self {
        Self {
            store,
            cluster,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record the status of a VirtualMachine and refresh its vApp's aggregate status
    pub async fn reconcile_virtual_machine(&self, vm: &VirtualMachine) -> Result<(), OrchestratorError> {
        let namespace = vm.namespace().unwrap_or_default();
        let name = vm.name_any();
        let Some(record) = self.store.find_vm_by_cluster_name(&namespace, &name).await? else {
            debug!("VirtualMachine {}/{} is not tracked, skipping", namespace, name);
            return Ok(());
        };
        let Some(observed) = observed_vm_status(vm) else {
            return Ok(());
        };
        self.apply_vm_status(&record, observed).await
    }

    /// Record the outcome of a TemplateInstance on its vApp
    ///
    /// On success, a VM record is created for every VirtualMachine the instance reports
    /// that is not yet tracked.
    pub async fn reconcile_template_instance(&self, instance: &TemplateInstance) -> Result<(), OrchestratorError> {
        let namespace = instance.namespace().unwrap_or_default();
        let name = instance.name_any();
        let Some(vapp) = self.store.find_vapp_by_instance(&namespace, &name).await? else {
            debug!("TemplateInstance {}/{} has no vApp, skipping", namespace, name);
            return Ok(());
        };
        let Some(status) = &instance.status else {
            return Ok(());
        };

        match status.phase() {
            InstancePhase::Pending => Ok(()),
            InstancePhase::Failed(message) => {
                warn!("Instantiation of vApp {} failed: {}", vapp.name, message);
                self.apply_vapp_status(&vapp, Status::Failed).await
            }
            InstancePhase::Ready => {
                for object in status.virtual_machines() {
                    let vm_namespace = object.namespace.as_deref().unwrap_or(&namespace);
                    self.track_vm(&vapp, vm_namespace, &object.name).await?;
                }
                self.apply_vapp_status(&vapp, Status::Deployed).await?;
                self.refresh_vapp(vapp.id).await
            }
        }
    }

    async fn track_vm(&self, vapp: &VApp, namespace: &str, name: &str) -> Result<(), OrchestratorError> {
        let record = match self.store.find_vm_by_cluster_name(namespace, name).await? {
            Some(existing) => existing,
            None => {
                let vm = Vm::new(vapp.id, namespace, name, Status::Deployed);
                match self.store.create_vm(&vm).await {
                    Ok(()) => info!("Tracking VM {}/{} in vApp {}", namespace, name, vapp.name),
                    Err(StoreError::Conflict { .. }) => return Ok(()),
                    Err(e) => return Err(e.into()),
                }
                vm
            }
        };

        // The VM may have reported its status before the record existed
        if let Some(cluster_vm) = self.cluster.get_virtual_machine(namespace, name).await?
            && let Some(observed) = observed_vm_status(&cluster_vm)
            && let Some(next) = observe(record.status, observed)
        {
            self.store.update_vm_status(record.id, next).await?;
        }
        Ok(())
    }

    async fn apply_vm_status(&self, record: &Vm, observed: Status) -> Result<(), OrchestratorError> {
        if let Some(next) = observe(record.status, observed) {
            debug!("VM {}: {} -> {}", record.name, record.status, next);
            self.store.update_vm_status(record.id, next).await?;
            self.refresh_vapp(record.vapp_id).await?;
        }
        Ok(())
    }

    async fn apply_vapp_status(&self, vapp: &VApp, observed: Status) -> Result<(), OrchestratorError> {
        if let Some(next) = observe(vapp.status, observed) {
            info!("vApp {}: {} -> {}", vapp.name, vapp.status, next);
            self.store.update_vapp_status(vapp.id, next).await?;
        }
        Ok(())
    }

    /// Move the vApp to the power state all its VMs agree on
    async fn refresh_vapp(&self, vapp_id: uuid::Uuid) -> Result<(), OrchestratorError> {
        let Some(vapp) = self.store.get_vapp(vapp_id).await? else {
            return Ok(());
        };
        let vms = self.store.list_vms_by_vapp(vapp.id).await?;
        let Some(first) = vms.first().map(|vm| vm.status) else {
            return Ok(());
        };
        let settled = matches!(first, Status::PoweredOn | Status::PoweredOff | Status::Suspended);
        if settled && vms.iter().all(|vm| vm.status == first) {
            self.apply_vapp_status(&vapp, first).await?;
        }
        Ok(())
    }

    /// Requeue delay after a failed reconciliation of `key`
    pub fn failure_delay(&self, key: &str) -> Duration {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_insert_with(BackoffState::new);
                state.error_count += 1;
                let delay = state.backoff.next_backoff();
                debug!("{} failed {} time(s), requeue in {:?}", key, state.error_count, delay);
                delay
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                MAX_REQUEUE
            }
        }
    }

    /// Forget the backoff of `key` after a successful reconciliation
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}

type ReconcileFuture = Pin<Box<dyn Future<Output = Result<Action, OrchestratorError>> + Send>>;

fn object_key<K: kube::Resource>(resource_name: &str, obj: &K) -> String {
    format!(
        "{}/{}/{}",
        resource_name,
        obj.namespace().unwrap_or_default(),
        obj.name_any()
    )
}

/// Generic watcher helper on top of kube_runtime::Controller.
///
/// Failed reconciliations are requeued with a per-object Fibonacci backoff; a success
/// resets it and waits for the next change.
async fn watch_resource<K, F>(
    api: Api<K>,
    config: watcher::Config,
    reconciler: Arc<StatusReconciler>,
    reconcile_fn: F,
    resource_name: &'static str,
) -> Result<(), OrchestratorError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    F: Fn(Arc<StatusReconciler>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    info!("Starting {} watcher", resource_name);

    let error_policy = move |obj: Arc<K>, error: &OrchestratorError, ctx: Arc<StatusReconciler>| {
        let key = object_key(resource_name, &*obj);
        error!("Reconciliation error for {}: {}", key, error);
        Action::requeue(ctx.failure_delay(&key))
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<StatusReconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let key = object_key(resource_name, &*obj);
            debug!("Reconciling {}", key);
            let action = reconcile_fn(Arc::clone(&ctx), obj).await?;
            ctx.reset_backoff(&key);
            Ok::<Action, OrchestratorError>(action)
        }
    };

    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    Controller::new(api, config)
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    Ok(())
}

/// Watches VirtualMachines and TemplateInstances across all namespaces.
pub struct Watcher {
    reconciler: Arc<StatusReconciler>,
    vm_api: Api<VirtualMachine>,
    instance_api: Api<TemplateInstance>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

impl Watcher {
    /// Cluster-wide watchers feeding `reconciler`
    pub fn new(client: Client, reconciler: Arc<StatusReconciler>) -> Self {
        Self {
            reconciler,
            vm_api: Api::all(client.clone()),
            instance_api: Api::all(client),
        }
    }

    /// VMs created by a template instance carry the broker's owner label
    pub async fn watch_virtual_machines(&self) -> Result<(), OrchestratorError> {
        watch_resource(
            self.vm_api.clone(),
            watcher::Config::default().labels(TEMPLATE_INSTANCE_OWNER_LABEL),
            Arc::clone(&self.reconciler),
            |reconciler, vm| {
                Box::pin(async move {
                    reconciler
                        .reconcile_virtual_machine(&vm)
                        .await
                        .map(|()| Action::await_change())
                })
            },
            "VirtualMachine",
        )
        .await
    }

    /// Instances created by this orchestrator carry the managed-by label
    pub async fn watch_template_instances(&self) -> Result<(), OrchestratorError> {
        let selector = format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE);
        watch_resource(
            self.instance_api.clone(),
            watcher::Config::default().labels(&selector),
            Arc::clone(&self.reconciler),
            |reconciler, instance| {
                Box::pin(async move {
                    reconciler
                        .reconcile_template_instance(&instance)
                        .await
                        .map(|()| Action::await_change())
                })
            },
            "TemplateInstance",
        )
        .await
    }
}

#[cfg(test)]
#[path = "watcher_test.rs"]
mod watcher_test;
