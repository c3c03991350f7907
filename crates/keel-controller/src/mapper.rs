//! Translate watch events into reconcile requests for the owning Cluster.

use crate::probe::kubeconfig_secret_name;
use keel_core::resources::GROUP;
use keel_core::types::split_api_version;
use keel_core::{
    Cluster, Machine, MachineDeployment, MachinePool, MachineSet, ObjectKey, Resource,
    ResourceEvent, Secret, TypedResource, CLUSTER_NAME_LABEL,
};
use tracing::debug;

/// Cluster keys to reconcile because of `event`
pub fn map_event(event: &ResourceEvent) -> Vec<ObjectKey> {
    let gvk = &event.gvk;
    let is = |group: &str, kind: &str| gvk.group == group && gvk.kind == kind;

    let keys = if is(Cluster::GROUP, Cluster::KIND) {
        vec![event.object_key()]
    } else if is(Machine::GROUP, Machine::KIND) {
        decode(event)
            .map(|machine: Machine| {
                let mut keys = control_plane_machine_to_cluster(&machine);
                keys.extend(owner_cluster_keys(&machine));
                keys.sort();
                keys.dedup();
                keys
            })
            .unwrap_or_default()
    } else if is(MachineDeployment::GROUP, MachineDeployment::KIND) {
        decode::<MachineDeployment>(event)
            .map(|md| owner_cluster_keys(&md))
            .unwrap_or_default()
    } else if is(MachineSet::GROUP, MachineSet::KIND) {
        decode::<MachineSet>(event)
            .map(|ms| owner_cluster_keys(&ms))
            .unwrap_or_default()
    } else if is(MachinePool::GROUP, MachinePool::KIND) {
        decode::<MachinePool>(event)
            .map(|mp| owner_cluster_keys(&mp))
            .unwrap_or_default()
    } else if is(Secret::GROUP, Secret::KIND) {
        decode::<Secret>(event)
            .and_then(|secret| kubeconfig_secret_to_cluster(&secret))
            .into_iter()
            .collect()
    } else {
        Vec::new()
    };

    if !keys.is_empty() {
        debug!(
            "{:?} {} maps to clusters {:?}",
            event.event_type, event.resource_key, keys
        );
    }
    keys
}

fn decode<T: TypedResource>(event: &ResourceEvent) -> Option<T> {
    match event.decode() {
        Ok(obj) => Some(obj),
        Err(e) => {
            debug!("Ignoring undecodable {}: {}", event.resource_key, e);
            None
        }
    }
}

/// A control plane machine that has become a Node maps to its cluster
pub fn control_plane_machine_to_cluster(machine: &Machine) -> Vec<ObjectKey> {
    if !machine.is_control_plane() || !machine.has_node_ref() {
        return Vec::new();
    }
    machine
        .cluster_name()
        .map(|cluster| vec![ObjectKey::new(machine.namespace(), cluster)])
        .unwrap_or_default()
}

/// Every Cluster named in the object's owner references
pub fn owner_cluster_keys<T: Resource>(obj: &T) -> Vec<ObjectKey> {
    obj.owner_references()
        .iter()
        .filter(|reference| {
            reference.kind == Cluster::KIND
                && !reference.name.is_empty()
                && split_api_version(&reference.api_version)
                    .is_ok_and(|(group, _)| group == GROUP)
        })
        .map(|reference| ObjectKey::new(obj.namespace(), &reference.name))
        .collect()
}

/// `<cluster>-kubeconfig` secrets carrying the cluster-name label
pub fn kubeconfig_secret_to_cluster(secret: &Secret) -> Option<ObjectKey> {
    let cluster = secret.label(CLUSTER_NAME_LABEL)?;
    (secret.name() == kubeconfig_secret_name(cluster))
        .then(|| ObjectKey::new(secret.namespace(), cluster))
}
