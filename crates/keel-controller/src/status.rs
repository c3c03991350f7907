//! Cluster condition aggregation.
//!
//! Every setter works on data collected earlier in the same cycle. When that
//! collection failed the setter leaves the previous value untouched, so a
//! transient read error never flips a condition.

use crate::descendants::ClusterDescendants;
use crate::probe::ProbeResult;
use keel_core::conditions::{
    self, CONTROL_PLANE_INITIALIZED, DELETING, INFRASTRUCTURE_READY, REMOTE_CONNECTION_PROBE,
};
use keel_core::{
    Cluster, ClusterDeletionStatus, ClusterPhase, Condition, DynamicObject, Resource,
};

pub mod reasons {
    pub const PROBE_SUCCEEDED: &str = "ProbeSucceeded";
    pub const PROBE_FAILED: &str = "ProbeFailed";

    pub const READY: &str = "Ready";
    pub const NOT_READY: &str = "NotReady";
    pub const DOES_NOT_EXIST: &str = "DoesNotExist";
    pub const DELETED: &str = "Deleted";

    pub const INITIALIZED: &str = "Initialized";
    pub const NOT_INITIALIZED: &str = "NotInitialized";
    pub const MISSING_NODE_REF: &str = "MissingNodeRef";
    pub const WAITING_FOR_CONTROL_PLANE_PROVIDER_INITIALIZED: &str =
        "WaitingForControlPlaneProviderInitialized";

    pub const NOT_DELETING: &str = "NotDeleting";
    pub const WAITING_FOR_WORKERS_DELETION: &str = "WaitingForWorkersDeletion";
    pub const WAITING_FOR_DELETION_APPROVAL: &str = "WaitingForDeletionApproval";
    pub const WAITING_FOR_CONTROL_PLANE_DELETION: &str = "WaitingForControlPlaneDeletion";
    pub const WAITING_FOR_INFRASTRUCTURE_DELETION: &str = "WaitingForInfrastructureDeletion";
    pub const DELETION_COMPLETED: &str = "DeletionCompleted";
}

const WAITING_FOR_NODE_REF_MESSAGE: &str =
    "Waiting for the first control plane machine to have its status.nodeRef set";

/// Outcome of reading a referenced provider object
#[derive(Debug, Clone, PartialEq)]
pub enum ChildFetch {
    NotReferenced,
    Found(DynamicObject),
    NotFound,
    Failed(String),
}

impl ChildFetch {
    pub fn object(&self) -> Option<&DynamicObject> {
        match self {
            ChildFetch::Found(obj) => Some(obj),
            _ => None,
        }
    }
}

/// `status.initialization.provisioned`, falling back to `status.ready`
pub fn infrastructure_ready(obj: &DynamicObject) -> bool {
    obj.bool_field(&["status", "initialization", "provisioned"])
        .or_else(|| obj.bool_field(&["status", "ready"]))
        .unwrap_or(false)
}

/// `status.initialization.controlPlaneInitialized`, falling back to `status.initialized`
pub fn control_plane_initialized(obj: &DynamicObject) -> bool {
    obj.bool_field(&["status", "initialization", "controlPlaneInitialized"])
        .or_else(|| obj.bool_field(&["status", "initialized"]))
        .unwrap_or(false)
}

/// Whether any control plane machine has joined as a Node
pub fn control_plane_machine_has_node(descendants: &ClusterDescendants) -> bool {
    descendants
        .control_plane_machines
        .values()
        .any(|machine| machine.has_node_ref())
}

fn set_condition(cluster: &mut Cluster, condition: Condition) {
    conditions::set(&mut cluster.status_mut().conditions, condition);
}

pub fn set_remote_connection_probe(cluster: &mut Cluster, result: &ProbeResult) {
    let condition = match result {
        ProbeResult::Reachable => {
            Condition::new(REMOTE_CONNECTION_PROBE, true, reasons::PROBE_SUCCEEDED)
        }
        ProbeResult::Unreachable(reason) => {
            Condition::new(REMOTE_CONNECTION_PROBE, false, reasons::PROBE_FAILED)
                .with_message(reason.as_str())
        }
    };
    set_condition(cluster, condition);
}

pub fn set_infrastructure_ready(cluster: &mut Cluster, infrastructure: &ChildFetch) {
    let kind = cluster
        .spec
        .infrastructure_ref
        .as_ref()
        .map(|r| r.kind.clone())
        .unwrap_or_default();

    let condition = match infrastructure {
        ChildFetch::Found(obj) => {
            let ready = infrastructure_ready(obj);
            let reason = if ready {
                reasons::READY
            } else {
                reasons::NOT_READY
            };
            let message = obj
                .status_condition("Ready")
                .and_then(|(_, message)| message)
                .unwrap_or_default();
            Condition::new(INFRASTRUCTURE_READY, ready, reason).with_message(message)
        }
        ChildFetch::NotFound if cluster.infrastructure_provisioned() => {
            Condition::new(INFRASTRUCTURE_READY, false, reasons::DELETED)
                .with_message(format!("{} has been deleted", kind))
        }
        ChildFetch::NotFound => Condition::new(INFRASTRUCTURE_READY, false, reasons::DOES_NOT_EXIST)
            .with_message(format!("{} does not exist", kind)),
        ChildFetch::NotReferenced | ChildFetch::Failed(_) => return,
    };
    set_condition(cluster, condition);
}

/// Current ControlPlaneInitialized condition.
///
/// `descendants` is `None` when discovery failed this cycle.
pub fn set_control_plane_initialized(
    cluster: &mut Cluster,
    control_plane: &ChildFetch,
    descendants: Option<&ClusterDescendants>,
) {
    if cluster.control_plane_initialized() {
        set_condition(
            cluster,
            Condition::new(CONTROL_PLANE_INITIALIZED, true, reasons::INITIALIZED),
        );
        return;
    }

    let condition = match &cluster.spec.control_plane_ref {
        Some(reference) => match control_plane {
            ChildFetch::Found(_) => {
                Condition::new(CONTROL_PLANE_INITIALIZED, false, reasons::NOT_INITIALIZED)
                    .with_message(format!("{} is not initialized", reference.kind))
            }
            ChildFetch::NotFound => {
                Condition::new(CONTROL_PLANE_INITIALIZED, false, reasons::DOES_NOT_EXIST)
                    .with_message(format!("{} does not exist", reference.kind))
            }
            ChildFetch::NotReferenced | ChildFetch::Failed(_) => return,
        },
        None => match descendants {
            Some(descendants) if control_plane_machine_has_node(descendants) => {
                Condition::new(CONTROL_PLANE_INITIALIZED, true, reasons::INITIALIZED)
            }
            Some(_) => Condition::new(CONTROL_PLANE_INITIALIZED, false, reasons::NOT_INITIALIZED)
                .with_message(WAITING_FOR_NODE_REF_MESSAGE),
            None => return,
        },
    };
    set_condition(cluster, condition);
}

/// Deprecated ControlPlaneInitialized in `status.v1beta1Conditions`.
///
/// Once True it is never written again.
pub fn set_legacy_control_plane_initialized(
    cluster: &mut Cluster,
    control_plane: &ChildFetch,
    descendants: Option<&ClusterDescendants>,
) {
    if conditions::is_true(cluster.v1beta1_conditions(), CONTROL_PLANE_INITIALIZED) {
        return;
    }

    let condition = if cluster.spec.control_plane_ref.is_some() {
        let Some(obj) = control_plane.object() else {
            return;
        };
        if control_plane_initialized(obj) {
            Condition::new(CONTROL_PLANE_INITIALIZED, true, reasons::INITIALIZED)
        } else {
            Condition::new(
                CONTROL_PLANE_INITIALIZED,
                false,
                reasons::WAITING_FOR_CONTROL_PLANE_PROVIDER_INITIALIZED,
            )
        }
    } else {
        let Some(descendants) = descendants else {
            return;
        };
        if control_plane_machine_has_node(descendants) {
            Condition::new(CONTROL_PLANE_INITIALIZED, true, reasons::INITIALIZED)
        } else {
            Condition::new(CONTROL_PLANE_INITIALIZED, false, reasons::MISSING_NODE_REF)
                .with_message(WAITING_FOR_NODE_REF_MESSAGE)
        }
    };
    conditions::set(&mut cluster.status_mut().v1beta1_conditions, condition);
}

pub fn set_not_deleting(cluster: &mut Cluster) {
    set_condition(
        cluster,
        Condition::new(DELETING, false, reasons::NOT_DELETING),
    );
    cluster.status_mut().deletion = None;
}

pub fn set_deleting(cluster: &mut Cluster, reason: &str, message: impl Into<String>) {
    set_condition(
        cluster,
        Condition::new(DELETING, true, reason).with_message(message),
    );
}

/// Record what the deletion is still waiting on
pub fn set_deletion_progress(cluster: &mut Cluster, wait_set: &ClusterDescendants) {
    let deletion = ClusterDeletionStatus {
        objects_pending_delete_count: wait_set.objects_pending_delete_count(cluster),
        objects_pending_delete_names: wait_set.objects_pending_delete_names(cluster),
    };
    cluster.status_mut().deletion = Some(deletion);
}

/// Phase and observedGeneration
pub fn set_summary(cluster: &mut Cluster) {
    let phase = if cluster.is_deleting() {
        ClusterPhase::Deleting
    } else if cluster.infrastructure_provisioned() {
        ClusterPhase::Provisioned
    } else if cluster.spec.infrastructure_ref.is_some() {
        ClusterPhase::Provisioning
    } else {
        ClusterPhase::Pending
    };
    let generation = cluster.metadata.generation;
    let status = cluster.status_mut();
    status.phase = Some(phase);
    status.observed_generation = generation;
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{ConditionStatus, ContractReference, Machine, MachineNodeReference, MachineStatus};
    use std::collections::BTreeMap;

    fn dynamic(status: serde_json::Value) -> DynamicObject {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta2",
            "kind": "DockerCluster",
            "metadata": {"name": "prod", "namespace": "default"},
            "status": status,
        }))
        .unwrap()
    }

    fn cluster_with_refs(infra: bool, control_plane: bool) -> Cluster {
        let mut cluster = Cluster::new("default", "prod");
        if infra {
            cluster.spec.infrastructure_ref = Some(ContractReference::new(
                "infrastructure.cluster.x-k8s.io",
                "DockerCluster",
                "prod",
            ));
        }
        if control_plane {
            cluster.spec.control_plane_ref = Some(ContractReference::new(
                "controlplane.cluster.x-k8s.io",
                "KubeadmControlPlane",
                "prod",
            ));
        }
        cluster
    }

    fn with_cp_machine(node: bool) -> ClusterDescendants {
        let machine = Machine {
            metadata: keel_core::ObjectMeta {
                name: Some("cp-0".to_string()),
                ..Default::default()
            },
            status: node.then(|| MachineStatus {
                node_ref: Some(MachineNodeReference {
                    name: "node-0".to_string(),
                }),
                phase: None,
            }),
            ..Default::default()
        };
        ClusterDescendants {
            control_plane_machines: BTreeMap::from([("cp-0".to_string(), machine)]),
            ..Default::default()
        }
    }

    fn condition<'a>(cluster: &'a Cluster, type_: &str) -> Option<&'a Condition> {
        conditions::get(cluster.conditions(), type_)
    }

    fn legacy<'a>(cluster: &'a Cluster) -> Option<&'a Condition> {
        conditions::get(cluster.v1beta1_conditions(), CONTROL_PLANE_INITIALIZED)
    }

    #[test]
    fn test_readiness_fallbacks() {
        assert!(infrastructure_ready(&dynamic(
            serde_json::json!({"initialization": {"provisioned": true}})
        )));
        assert!(infrastructure_ready(&dynamic(serde_json::json!({"ready": true}))));
        assert!(!infrastructure_ready(&dynamic(serde_json::json!({}))));

        assert!(control_plane_initialized(&dynamic(
            serde_json::json!({"initialization": {"controlPlaneInitialized": true}})
        )));
        assert!(control_plane_initialized(&dynamic(serde_json::json!({"initialized": true}))));
        assert!(!control_plane_initialized(&dynamic(serde_json::json!({"initialized": false}))));
    }

    #[test]
    fn test_remote_connection_probe() {
        let mut cluster = Cluster::new("default", "prod");
        set_remote_connection_probe(&mut cluster, &ProbeResult::Unreachable("no secret".into()));
        let probe = condition(&cluster, REMOTE_CONNECTION_PROBE).unwrap();
        assert_eq!(probe.status, ConditionStatus::False);
        assert_eq!(probe.reason, reasons::PROBE_FAILED);
        assert_eq!(probe.message.as_deref(), Some("no secret"));

        set_remote_connection_probe(&mut cluster, &ProbeResult::Reachable);
        let probe = condition(&cluster, REMOTE_CONNECTION_PROBE).unwrap();
        assert!(probe.is_true());
        assert_eq!(probe.reason, reasons::PROBE_SUCCEEDED);
        assert!(probe.message.is_none());
    }

    #[test]
    fn test_infrastructure_ready_mirrors_object() {
        let mut cluster = cluster_with_refs(true, false);
        let obj = dynamic(serde_json::json!({
            "conditions": [{"type": "Ready", "status": "False", "message": "3 of 4 subnets ready"}]
        }));
        set_infrastructure_ready(&mut cluster, &ChildFetch::Found(obj));

        let ready = condition(&cluster, INFRASTRUCTURE_READY).unwrap();
        assert_eq!(ready.reason, reasons::NOT_READY);
        assert_eq!(ready.message.as_deref(), Some("3 of 4 subnets ready"));

        set_infrastructure_ready(
            &mut cluster,
            &ChildFetch::Found(dynamic(serde_json::json!({"ready": true}))),
        );
        assert!(condition(&cluster, INFRASTRUCTURE_READY).unwrap().is_true());
    }

    #[test]
    fn test_infrastructure_missing() {
        let mut cluster = cluster_with_refs(true, false);
        set_infrastructure_ready(&mut cluster, &ChildFetch::NotFound);
        assert_eq!(
            condition(&cluster, INFRASTRUCTURE_READY).unwrap().reason,
            reasons::DOES_NOT_EXIST
        );

        cluster.mark_infrastructure_provisioned();
        set_infrastructure_ready(&mut cluster, &ChildFetch::NotFound);
        assert_eq!(
            condition(&cluster, INFRASTRUCTURE_READY).unwrap().reason,
            reasons::DELETED
        );

        // A failed read keeps the previous value
        set_infrastructure_ready(&mut cluster, &ChildFetch::Failed("timeout".into()));
        assert_eq!(
            condition(&cluster, INFRASTRUCTURE_READY).unwrap().reason,
            reasons::DELETED
        );
    }

    #[test]
    fn test_infrastructure_unreferenced_is_unset() {
        let mut cluster = cluster_with_refs(false, false);
        set_infrastructure_ready(&mut cluster, &ChildFetch::NotReferenced);
        assert!(condition(&cluster, INFRASTRUCTURE_READY).is_none());
    }

    #[test]
    fn test_control_plane_initialized_from_machines() {
        let mut cluster = cluster_with_refs(false, false);

        set_control_plane_initialized(&mut cluster, &ChildFetch::NotReferenced, None);
        assert!(condition(&cluster, CONTROL_PLANE_INITIALIZED).is_none());

        set_control_plane_initialized(
            &mut cluster,
            &ChildFetch::NotReferenced,
            Some(&with_cp_machine(false)),
        );
        assert_eq!(
            condition(&cluster, CONTROL_PLANE_INITIALIZED).unwrap().reason,
            reasons::NOT_INITIALIZED
        );

        set_control_plane_initialized(
            &mut cluster,
            &ChildFetch::NotReferenced,
            Some(&with_cp_machine(true)),
        );
        assert!(condition(&cluster, CONTROL_PLANE_INITIALIZED).unwrap().is_true());
    }

    #[test]
    fn test_control_plane_initialized_with_reference() {
        let mut cluster = cluster_with_refs(false, true);
        set_control_plane_initialized(&mut cluster, &ChildFetch::NotFound, None);
        assert_eq!(
            condition(&cluster, CONTROL_PLANE_INITIALIZED).unwrap().reason,
            reasons::DOES_NOT_EXIST
        );

        // The latched flag wins over whatever the object says now
        cluster.mark_control_plane_initialized();
        set_control_plane_initialized(&mut cluster, &ChildFetch::NotFound, None);
        assert!(condition(&cluster, CONTROL_PLANE_INITIALIZED).unwrap().is_true());
    }

    #[test]
    fn test_legacy_condition_is_monotonic() {
        let mut cluster = cluster_with_refs(false, false);
        set_legacy_control_plane_initialized(
            &mut cluster,
            &ChildFetch::NotReferenced,
            Some(&with_cp_machine(false)),
        );
        let waiting = legacy(&cluster).unwrap();
        assert_eq!(waiting.reason, reasons::MISSING_NODE_REF);
        assert_eq!(waiting.message.as_deref(), Some(WAITING_FOR_NODE_REF_MESSAGE));

        set_legacy_control_plane_initialized(
            &mut cluster,
            &ChildFetch::NotReferenced,
            Some(&with_cp_machine(true)),
        );
        assert!(legacy(&cluster).unwrap().is_true());

        // Node loss does not reset it
        set_legacy_control_plane_initialized(
            &mut cluster,
            &ChildFetch::NotReferenced,
            Some(&ClusterDescendants::default()),
        );
        assert!(legacy(&cluster).unwrap().is_true());
        assert!(condition(&cluster, CONTROL_PLANE_INITIALIZED).is_none());
    }

    #[test]
    fn test_legacy_condition_with_reference_needs_object() {
        let mut cluster = cluster_with_refs(false, true);
        set_legacy_control_plane_initialized(&mut cluster, &ChildFetch::NotFound, None);
        assert!(legacy(&cluster).is_none());

        set_legacy_control_plane_initialized(
            &mut cluster,
            &ChildFetch::Found(dynamic(serde_json::json!({}))),
            None,
        );
        assert_eq!(
            legacy(&cluster).unwrap().reason,
            reasons::WAITING_FOR_CONTROL_PLANE_PROVIDER_INITIALIZED
        );

        set_legacy_control_plane_initialized(
            &mut cluster,
            &ChildFetch::Found(dynamic(serde_json::json!({"initialized": true}))),
            None,
        );
        assert!(legacy(&cluster).unwrap().is_true());
    }

    #[test]
    fn test_summary() {
        let mut cluster = cluster_with_refs(true, false);
        cluster.metadata.generation = Some(3);
        set_summary(&mut cluster);
        let status = cluster.status.as_ref().unwrap();
        assert_eq!(status.phase, Some(ClusterPhase::Provisioning));
        assert_eq!(status.observed_generation, Some(3));

        cluster.mark_infrastructure_provisioned();
        set_summary(&mut cluster);
        assert_eq!(
            cluster.status.as_ref().unwrap().phase,
            Some(ClusterPhase::Provisioned)
        );
    }
}
