//! Worker groups: MachineDeployments, MachineSets and MachinePools.

use super::{typed_resource, GROUP, VERSION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Spec fields shared by every worker group kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerGroupSpec {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineDeployment {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkerGroupSpec,
}

typed_resource!(MachineDeployment, GROUP, VERSION, "MachineDeployment");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineSet {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkerGroupSpec,
}

typed_resource!(MachineSet, GROUP, VERSION, "MachineSet");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachinePool {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkerGroupSpec,
}

typed_resource!(MachinePool, GROUP, VERSION, "MachinePool");
