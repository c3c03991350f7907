use super::{typed_resource, GROUP, VERSION};
use crate::conditions::Condition;
use crate::error::{KeelError, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The top-level managed cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ClusterSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ClusterStatus>,
}

typed_resource!(Cluster, GROUP, VERSION, "Cluster");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ContractReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<ContractReference>,
}

/// Versionless pointer to a provider object in the Cluster's namespace.
/// The version is resolved through the [`Scheme`](crate::Scheme).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractReference {
    #[serde(default)]
    pub api_group: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

impl ContractReference {
    pub fn new(
        api_group: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_group: api_group.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Reject references that cannot be followed
    pub fn validate(&self) -> Result<()> {
        if self.kind.is_empty() {
            return Err(KeelError::invalid_reference(self.to_string(), "kind is empty"));
        }
        if self.name.is_empty() {
            return Err(KeelError::invalid_reference(self.to_string(), "name is empty"));
        }
        Ok(())
    }
}

impl fmt::Display for ContractReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.api_group.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}.{}/{}", self.kind, self.api_group, self.name)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Conditions kept for v1beta1 consumers
    #[serde(
        default,
        rename = "v1beta1Conditions",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub v1beta1_conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialization: Option<ClusterInitializationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion: Option<ClusterDeletionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ClusterPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// One-way provisioning milestones; never reset once true
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInitializationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_provisioned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_initialized: Option<bool>,
}

/// Summary of the descendants a deleting Cluster is still waiting on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDeletionStatus {
    pub objects_pending_delete_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects_pending_delete_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterPhase {
    Pending,
    Provisioning,
    Provisioned,
    Deleting,
}

impl Cluster {
    /// Create an empty Cluster with the given identity
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                namespace: Some(namespace.into()),
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn status_mut(&mut self) -> &mut ClusterStatus {
        self.status.get_or_insert_with(ClusterStatus::default)
    }

    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    pub fn v1beta1_conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.v1beta1_conditions.as_slice())
            .unwrap_or_default()
    }

    pub fn initialization(&self) -> ClusterInitializationStatus {
        self.status
            .as_ref()
            .and_then(|s| s.initialization.clone())
            .unwrap_or_default()
    }

    pub fn infrastructure_provisioned(&self) -> bool {
        self.initialization().infrastructure_provisioned == Some(true)
    }

    pub fn control_plane_initialized(&self) -> bool {
        self.initialization().control_plane_initialized == Some(true)
    }

    /// Latch the infrastructure milestone
    pub fn mark_infrastructure_provisioned(&mut self) {
        self.status_mut()
            .initialization
            .get_or_insert_with(Default::default)
            .infrastructure_provisioned = Some(true);
    }

    /// Latch the control plane milestone
    pub fn mark_control_plane_initialized(&mut self) {
        self.status_mut()
            .initialization
            .get_or_insert_with(Default::default)
            .control_plane_initialized = Some(true);
    }
}
