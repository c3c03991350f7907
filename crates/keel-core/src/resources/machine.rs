use super::{typed_resource, Resource, CLUSTER_NAME_LABEL, GROUP, MACHINE_CONTROL_PLANE_LABEL, VERSION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// A single compute host belonging to a Cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: MachineSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MachineStatus>,
}

typed_resource!(Machine, GROUP, VERSION, "Machine");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<MachineNodeReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// The workload-cluster Node backing a Machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineNodeReference {
    pub name: String,
}

impl Machine {
    pub fn is_control_plane(&self) -> bool {
        self.has_label(MACHINE_CONTROL_PLANE_LABEL)
    }

    /// Whether the Machine has become a Node
    pub fn has_node_ref(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.node_ref.as_ref())
            .is_some_and(|n| !n.name.is_empty())
    }

    /// The owning cluster name: `spec.clusterName`, falling back to the cluster-name label
    pub fn cluster_name(&self) -> Option<&str> {
        if !self.spec.cluster_name.is_empty() {
            return Some(&self.spec.cluster_name);
        }
        self.label(CLUSTER_NAME_LABEL).filter(|n| !n.is_empty())
    }
}
