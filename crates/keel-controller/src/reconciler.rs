use crate::client::Client;
use crate::deletion::{self, Teardown};
use crate::descendants::ClusterDescendants;
use crate::error::{ControllerError, Result};
use crate::patch::PatchHelper;
use crate::probe::{ProbeResult, RemoteProber};
use crate::status::{self, reasons, ChildFetch};
use keel_core::{
    Cluster, ContractReference, ObjectKey, Resource, ResourceKey, Scheme, CLUSTER_FINALIZER,
    OK_TO_DELETE_ANNOTATION,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the cluster reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Requeue delay after a failed connectivity probe
    pub probe_retry_interval: Duration,
    /// Requeue delay while a deleting cluster waits on its descendants
    pub deletion_requeue_interval: Duration,
    /// Only tear down infrastructure once the ok-to-delete annotation is set
    pub require_deletion_approval: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            probe_retry_interval: Duration::from_secs(10),
            deletion_requeue_interval: Duration::from_secs(5),
            require_deletion_approval: true,
        }
    }
}

/// What the queue should do with a key after a successful reconcile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Action {
    pub requeue_after: Option<Duration>,
}

impl Action {
    /// Nothing to do until the next watch event
    pub fn await_change() -> Self {
        Self::default()
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// State gathered for one reconcile cycle
struct Scope {
    cluster: Cluster,
    infrastructure: ChildFetch,
    control_plane: ChildFetch,
    descendants: ClusterDescendants,
    descendants_discovered: bool,
}

/// Drives a Cluster toward its declared state, and tears it down in order
pub struct Reconciler {
    client: Client,
    prober: Arc<dyn RemoteProber>,
    scheme: Arc<Scheme>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        client: Client,
        prober: Arc<dyn RemoteProber>,
        scheme: Arc<Scheme>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            client,
            prober,
            scheme,
            config,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Run one reconcile cycle for the cluster at `key`
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(cluster) = self.client.get_opt::<Cluster>(key).await? else {
            debug!("Cluster {} is gone", key);
            return Ok(Action::await_change());
        };

        if cluster.is_deleting() {
            self.reconcile_delete(cluster).await
        } else {
            self.reconcile_normal(cluster).await
        }
    }

    async fn reconcile_normal(&self, mut cluster: Cluster) -> Result<Action> {
        let key = cluster.object_key();

        // The finalizer must be stored before anything is created on the cluster's behalf
        if !cluster.has_finalizer(CLUSTER_FINALIZER) {
            let helper = PatchHelper::new(&cluster)?;
            cluster.add_finalizer(CLUSTER_FINALIZER);
            if let Some(updated) = helper.patch(&self.client, &cluster).await? {
                cluster = updated;
            }
            info!("Added finalizer to cluster {}", key);
        }

        if cluster.spec.paused {
            debug!("Cluster {} is paused", key);
            return Ok(Action::await_change());
        }

        let helper = PatchHelper::new(&cluster)?;
        let mut errors = Vec::new();

        let probe = self.prober.probe(&cluster).await;
        if let ProbeResult::Unreachable(reason) = &probe {
            debug!("Cluster {} is not reachable: {}", key, reason);
        }

        let infrastructure = self
            .fetch_reference(&cluster, cluster.spec.infrastructure_ref.as_ref(), &mut errors)
            .await;
        let control_plane = self
            .fetch_reference(&cluster, cluster.spec.control_plane_ref.as_ref(), &mut errors)
            .await;
        let (descendants, descendants_discovered) =
            match ClusterDescendants::discover(&self.client, &cluster).await {
                Ok(descendants) => (descendants, true),
                Err(e) => {
                    warn!("Failed to list descendants of cluster {}: {}", key, e);
                    errors.push(e);
                    (ClusterDescendants::default(), false)
                }
            };

        let mut scope = Scope {
            cluster,
            infrastructure,
            control_plane,
            descendants,
            descendants_discovered,
        };
        latch_initialization(&mut scope);

        let discovered = scope
            .descendants_discovered
            .then_some(&scope.descendants);
        let cluster = &mut scope.cluster;
        status::set_remote_connection_probe(cluster, &probe);
        status::set_infrastructure_ready(cluster, &scope.infrastructure);
        status::set_control_plane_initialized(cluster, &scope.control_plane, discovered);
        status::set_legacy_control_plane_initialized(cluster, &scope.control_plane, discovered);
        status::set_not_deleting(cluster);
        status::set_summary(cluster);

        if let Err(e) = helper.patch(&self.client, &scope.cluster).await {
            errors.push(e);
        }
        ControllerError::aggregate(errors)?;

        if probe.is_reachable() {
            Ok(Action::await_change())
        } else {
            Ok(Action::requeue(self.config.probe_retry_interval))
        }
    }

    async fn reconcile_delete(&self, mut cluster: Cluster) -> Result<Action> {
        let key = cluster.object_key();
        if !cluster.has_finalizer(CLUSTER_FINALIZER) {
            debug!("Cluster {} has no finalizer, nothing to tear down", key);
            return Ok(Action::await_change());
        }

        // Without a complete view of the descendants nothing may be deleted
        let descendants = ClusterDescendants::discover(&self.client, &cluster).await?;
        let wait_set = descendants.filter_owned(&cluster);

        let helper = PatchHelper::new(&cluster)?;
        let mut errors = Vec::new();

        // Nothing is deleted on the cluster's behalf until teardown is approved
        let approved =
            !self.config.require_deletion_approval || deletion::deletion_approved(&cluster);
        if approved {
            if let Err(e) = deletion::delete_descendants(&self.client, &wait_set).await {
                errors.push(e);
            }
        }
        status::set_deletion_progress(&mut cluster, &wait_set);
        status::set_summary(&mut cluster);

        let action = if !approved {
            debug!("Cluster {} waiting for deletion approval", key);
            status::set_deleting(
                &mut cluster,
                reasons::WAITING_FOR_DELETION_APPROVAL,
                format!("Waiting for the {} annotation", OK_TO_DELETE_ANNOTATION),
            );
            Action::await_change()
        } else if !wait_set.is_empty() {
            let pending = wait_set.objects_pending_delete_names(&cluster);
            debug!(
                "Cluster {} waiting on {} descendants",
                key,
                wait_set.objects_pending_delete_count(&cluster)
            );
            status::set_deleting(
                &mut cluster,
                reasons::WAITING_FOR_WORKERS_DELETION,
                pending
                    .iter()
                    .map(|line| format!("* {}", line))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
            Action::requeue(self.config.deletion_requeue_interval)
        } else {
            match self.teardown(&mut cluster).await {
                Ok(action) => action,
                Err(e) => {
                    errors.push(e);
                    Action::await_change()
                }
            }
        };

        if let Err(e) = helper.patch(&self.client, &cluster).await {
            errors.push(e);
        }
        ControllerError::aggregate(errors)?;

        if !cluster.has_finalizer(CLUSTER_FINALIZER) {
            info!("Removed finalizer from cluster {}", key);
        }
        Ok(action)
    }

    /// Delete the control plane, then the infrastructure, then release the cluster
    async fn teardown(&self, cluster: &mut Cluster) -> Result<Action> {
        let steps = [
            (
                cluster.spec.control_plane_ref.clone(),
                reasons::WAITING_FOR_CONTROL_PLANE_DELETION,
            ),
            (
                cluster.spec.infrastructure_ref.clone(),
                reasons::WAITING_FOR_INFRASTRUCTURE_DELETION,
            ),
        ];

        for (reference, waiting_reason) in steps {
            let teardown = deletion::delete_reference(
                &self.client,
                &self.scheme,
                cluster,
                reference.as_ref(),
            )
            .await?;
            if let (Teardown::Pending, Some(reference)) = (teardown, reference) {
                status::set_deleting(
                    cluster,
                    waiting_reason,
                    format!("Waiting for {} to be deleted", reference),
                );
                return Ok(Action::requeue(self.config.deletion_requeue_interval));
            }
        }

        status::set_deleting(cluster, reasons::DELETION_COMPLETED, "");
        cluster.remove_finalizer(CLUSTER_FINALIZER);
        Ok(Action::await_change())
    }

    /// Read the object behind a contract reference. Lookup failures are
    /// pushed onto `errors`; malformed references are only logged.
    async fn fetch_reference(
        &self,
        cluster: &Cluster,
        reference: Option<&ContractReference>,
        errors: &mut Vec<ControllerError>,
    ) -> ChildFetch {
        let Some(reference) = reference else {
            return ChildFetch::NotReferenced;
        };
        let gvk = match self.scheme.resolve(reference) {
            Ok(gvk) => gvk,
            Err(e) => {
                warn!(
                    "Skipping reference {} on cluster {}: {}",
                    reference,
                    cluster.object_key(),
                    e
                );
                return ChildFetch::Failed(e.to_string());
            }
        };

        let key = ResourceKey::new(gvk, cluster.namespace(), &reference.name);
        match self.client.get_dynamic(&key).await {
            Ok(Some(obj)) => ChildFetch::Found(obj),
            Ok(None) => ChildFetch::NotFound,
            Err(e) => {
                let message = e.to_string();
                errors.push(e);
                ChildFetch::Failed(message)
            }
        }
    }
}

/// Latch the one-way initialization flags from this cycle's observations
fn latch_initialization(scope: &mut Scope) {
    let key = scope.cluster.object_key();

    if !scope.cluster.infrastructure_provisioned()
        && scope
            .infrastructure
            .object()
            .is_some_and(status::infrastructure_ready)
    {
        info!("Infrastructure of cluster {} is provisioned", key);
        scope.cluster.mark_infrastructure_provisioned();
    }

    if scope.cluster.control_plane_initialized() {
        return;
    }
    let initialized = if scope.cluster.spec.control_plane_ref.is_some() {
        scope
            .control_plane
            .object()
            .is_some_and(status::control_plane_initialized)
    } else {
        scope.descendants_discovered
            && status::control_plane_machine_has_node(&scope.descendants)
    };
    if initialized {
        info!("Control plane of cluster {} is initialized", key);
        scope.cluster.mark_control_plane_initialized();
    }
}
