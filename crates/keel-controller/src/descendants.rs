//! Descendant index and ownership filter.
//!
//! A cluster's descendants are kept as five flat collections keyed by object
//! name, so every iteration (deletion, progress reporting) is name-sorted.

use crate::client::Client;
use crate::error::Result;
use keel_core::resources::GROUP;
use keel_core::types::split_api_version;
use keel_core::{
    Cluster, GroupVersionKind, Machine, MachineDeployment, MachinePool, MachineSet, ObjectMeta,
    OwnerReference, Resource, ResourceKey, TypedResource, CLUSTER_NAME_LABEL,
};
use keel_storage::LabelSelector;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Worker machine names listed before the remainder is summarized
const WORKER_MACHINE_NAME_LIMIT: usize = 5;

/// The five descendant collections, in reporting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescendantKind {
    ControlPlaneMachine,
    MachineDeployment,
    MachineSet,
    MachinePool,
    WorkerMachine,
}

impl DescendantKind {
    pub const ALL: [DescendantKind; 5] = [
        DescendantKind::ControlPlaneMachine,
        DescendantKind::MachineDeployment,
        DescendantKind::MachineSet,
        DescendantKind::MachinePool,
        DescendantKind::WorkerMachine,
    ];

    /// Kinds torn down before control plane machines
    pub const WORKERS: [DescendantKind; 4] = [
        DescendantKind::MachineDeployment,
        DescendantKind::MachineSet,
        DescendantKind::MachinePool,
        DescendantKind::WorkerMachine,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            DescendantKind::ControlPlaneMachine => "Control plane Machines",
            DescendantKind::MachineDeployment => "MachineDeployments",
            DescendantKind::MachineSet => "MachineSets",
            DescendantKind::MachinePool => "MachinePools",
            DescendantKind::WorkerMachine => "Worker Machines",
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        match self {
            DescendantKind::ControlPlaneMachine | DescendantKind::WorkerMachine => {
                Machine::type_gvk()
            }
            DescendantKind::MachineDeployment => MachineDeployment::type_gvk(),
            DescendantKind::MachineSet => MachineSet::type_gvk(),
            DescendantKind::MachinePool => MachinePool::type_gvk(),
        }
    }

    fn name_limit(&self) -> Option<usize> {
        match self {
            DescendantKind::WorkerMachine => Some(WORKER_MACHINE_NAME_LIMIT),
            _ => None,
        }
    }
}

impl fmt::Display for DescendantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Every object of the five descendant kinds that belongs to one cluster
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterDescendants {
    pub control_plane_machines: BTreeMap<String, Machine>,
    pub machine_deployments: BTreeMap<String, MachineDeployment>,
    pub machine_sets: BTreeMap<String, MachineSet>,
    pub machine_pools: BTreeMap<String, MachinePool>,
    pub worker_machines: BTreeMap<String, Machine>,
}

impl ClusterDescendants {
    /// List everything carrying the cluster-name label in the cluster's namespace
    pub async fn discover(client: &Client, cluster: &Cluster) -> Result<Self> {
        let namespace = Some(cluster.namespace());
        let selector = LabelSelector::everything().eq(CLUSTER_NAME_LABEL, cluster.name());

        let (machines, machine_deployments, machine_sets, machine_pools) = tokio::try_join!(
            client.list::<Machine>(namespace, &selector),
            client.list::<MachineDeployment>(namespace, &selector),
            client.list::<MachineSet>(namespace, &selector),
            client.list::<MachinePool>(namespace, &selector),
        )?;

        let mut descendants = Self {
            machine_deployments: by_name(machine_deployments),
            machine_sets: by_name(machine_sets),
            machine_pools: by_name(machine_pools),
            ..Default::default()
        };
        for machine in machines {
            let target = if machine.is_control_plane() {
                &mut descendants.control_plane_machines
            } else {
                &mut descendants.worker_machines
            };
            target.insert(machine.name().to_string(), machine);
        }

        debug!(
            "Discovered {} descendants of cluster {}",
            descendants.total(),
            cluster.object_key()
        );
        Ok(descendants)
    }

    /// Keep only objects owned by `cluster`.
    ///
    /// Control plane machines are dropped entirely when the cluster has a
    /// control plane reference: the control plane provider owns their teardown.
    pub fn filter_owned(&self, cluster: &Cluster) -> Self {
        let name = cluster.name();
        Self {
            control_plane_machines: if cluster.spec.control_plane_ref.is_some() {
                BTreeMap::new()
            } else {
                owned(&self.control_plane_machines, name)
            },
            machine_deployments: owned(&self.machine_deployments, name),
            machine_sets: owned(&self.machine_sets, name),
            machine_pools: owned(&self.machine_pools, name),
            worker_machines: owned(&self.worker_machines, name),
        }
    }

    /// Metadata of one collection, name-sorted
    pub fn metadata(&self, kind: DescendantKind) -> Vec<&ObjectMeta> {
        match kind {
            DescendantKind::ControlPlaneMachine => metas(&self.control_plane_machines),
            DescendantKind::MachineDeployment => metas(&self.machine_deployments),
            DescendantKind::MachineSet => metas(&self.machine_sets),
            DescendantKind::MachinePool => metas(&self.machine_pools),
            DescendantKind::WorkerMachine => metas(&self.worker_machines),
        }
    }

    pub fn names(&self, kind: DescendantKind) -> Vec<&str> {
        self.metadata(kind)
            .into_iter()
            .filter_map(|meta| meta.name.as_deref())
            .collect()
    }

    /// Keys of members that are not already being deleted
    pub fn deletable(&self, kind: DescendantKind) -> Vec<ResourceKey> {
        self.metadata(kind)
            .into_iter()
            .filter(|meta| meta.deletion_timestamp.is_none())
            .filter_map(|meta| {
                Some(ResourceKey::new(
                    kind.gvk(),
                    meta.namespace.as_deref().unwrap_or_default(),
                    meta.name.as_deref()?,
                ))
            })
            .collect()
    }

    pub fn len(&self, kind: DescendantKind) -> usize {
        match kind {
            DescendantKind::ControlPlaneMachine => self.control_plane_machines.len(),
            DescendantKind::MachineDeployment => self.machine_deployments.len(),
            DescendantKind::MachineSet => self.machine_sets.len(),
            DescendantKind::MachinePool => self.machine_pools.len(),
            DescendantKind::WorkerMachine => self.worker_machines.len(),
        }
    }

    pub fn total(&self) -> usize {
        DescendantKind::ALL.iter().map(|kind| self.len(*kind)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Whether any worker-kind collection still has members
    pub fn has_workers(&self) -> bool {
        DescendantKind::WORKERS.iter().any(|kind| self.len(*kind) > 0)
    }

    /// Collections reported for `cluster`; control plane machines only without a control plane reference
    fn reported_kinds(cluster: &Cluster) -> impl Iterator<Item = DescendantKind> {
        let has_control_plane_ref = cluster.spec.control_plane_ref.is_some();
        DescendantKind::ALL.into_iter().filter(move |kind| {
            !(has_control_plane_ref && *kind == DescendantKind::ControlPlaneMachine)
        })
    }

    pub fn objects_pending_delete_count(&self, cluster: &Cluster) -> usize {
        Self::reported_kinds(cluster)
            .map(|kind| self.len(kind))
            .sum()
    }

    /// One `"<Kind>: a, b, c"` line per non-empty reported collection
    pub fn objects_pending_delete_names(&self, cluster: &Cluster) -> Vec<String> {
        Self::reported_kinds(cluster)
            .filter_map(|kind| {
                let names = self.names(kind);
                if names.is_empty() {
                    return None;
                }
                Some(format!("{}: {}", kind, summarize(&names, kind.name_limit())))
            })
            .collect()
    }
}

fn by_name<T: Resource>(items: Vec<T>) -> BTreeMap<String, T> {
    items
        .into_iter()
        .map(|item| (item.name().to_string(), item))
        .collect()
}

fn metas<T: Resource>(items: &BTreeMap<String, T>) -> Vec<&ObjectMeta> {
    items.values().map(Resource::metadata).collect()
}

fn owned<T: Resource + Clone>(items: &BTreeMap<String, T>, cluster_name: &str) -> BTreeMap<String, T> {
    items
        .iter()
        .filter(|(_, item)| {
            item.owner_references()
                .iter()
                .any(|reference| references_cluster(reference, cluster_name, item.name()))
        })
        .map(|(name, item)| (name.clone(), item.clone()))
        .collect()
}

/// Whether an owner reference points at the named Cluster, regardless of version
fn references_cluster(reference: &OwnerReference, cluster_name: &str, owner_of: &str) -> bool {
    if reference.kind.is_empty() || reference.name.is_empty() {
        warn!(
            "Skipping owner reference on {} with empty kind or name",
            owner_of
        );
        return false;
    }
    let group = match split_api_version(&reference.api_version) {
        Ok((group, _)) => group,
        Err(e) => {
            warn!("Skipping malformed owner reference on {}: {}", owner_of, e);
            return false;
        }
    };
    group == GROUP && reference.kind == Cluster::KIND && reference.name == cluster_name
}

fn summarize(names: &[&str], limit: Option<usize>) -> String {
    match limit {
        Some(limit) if names.len() > limit => format!(
            "{}, ... ({} more)",
            names[..limit].join(", "),
            names.len() - limit
        ),
        _ => names.join(", "),
    }
}
