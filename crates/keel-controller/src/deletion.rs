use crate::client::Client;
use crate::descendants::{ClusterDescendants, DescendantKind};
use crate::error::{ControllerError, Result};
use keel_core::{
    Cluster, ContractReference, Resource, ResourceKey, Scheme, OK_TO_DELETE_ANNOTATION,
};
use tracing::{debug, info};

/// Whether the external approval marker is present on the cluster
pub fn deletion_approved(cluster: &Cluster) -> bool {
    cluster.has_annotation(OK_TO_DELETE_ANNOTATION)
}

/// State of a referenced object after a delete was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Not referenced, or no longer in the store
    Gone,
    /// Still present, typically held by its own finalizers
    Pending,
}

/// Issue deletes for the members of the wait set.
///
/// Worker kinds go first, in reporting order. Control plane machines are only
/// deleted once no worker-kind member remains. Members already being deleted
/// are left alone. Every failure is collected; not-found counts as success.
pub async fn delete_descendants(client: &Client, wait_set: &ClusterDescendants) -> Result<()> {
    let mut kinds = DescendantKind::WORKERS.to_vec();
    if !wait_set.has_workers() {
        kinds.push(DescendantKind::ControlPlaneMachine);
    }

    let mut errors = Vec::new();
    for kind in kinds {
        for key in wait_set.deletable(kind) {
            match client.delete(&key).await {
                Ok(true) => info!("Deleted {}", key),
                Ok(false) => {}
                Err(e) => errors.push(e),
            }
        }
    }

    ControllerError::aggregate(errors)
}

/// Delete the object behind a contract reference and report whether it is gone
pub async fn delete_reference(
    client: &Client,
    scheme: &Scheme,
    cluster: &Cluster,
    reference: Option<&ContractReference>,
) -> Result<Teardown> {
    let Some(reference) = reference else {
        return Ok(Teardown::Gone);
    };
    let key = ResourceKey::new(
        scheme.resolve(reference)?,
        cluster.namespace(),
        &reference.name,
    );

    let Some(object) = client.get_dynamic(&key).await? else {
        debug!("{} is gone", key);
        return Ok(Teardown::Gone);
    };
    if !object.is_deleting() {
        if !client.delete(&key).await? {
            return Ok(Teardown::Gone);
        }
        info!("Deleted {}", key);
    }

    match client.get_dynamic(&key).await? {
        Some(_) => Ok(Teardown::Pending),
        None => Ok(Teardown::Gone),
    }
}
