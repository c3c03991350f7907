//! Keel Core - resource model for the Keel cluster lifecycle controller
//!
//! This crate provides:
//! - Cluster API resource types (Cluster, Machine, worker groups) and an untyped object
//! - Typed status conditions with an idempotent setter
//! - Type-safe resource keys, watch events and the kind scheme
//! - Error types with miette diagnostics

pub mod conditions;
pub mod error;
pub mod events;
pub mod resources;
pub mod scheme;
pub mod types;

// Re-export commonly used types
pub use conditions::{Condition, ConditionStatus};
pub use error::{KeelError, Result};
pub use events::{ResourceEvent, WatchEventType};
pub use resources::{
    is_valid_name, Cluster, ClusterDeletionStatus, ClusterInitializationStatus, ClusterPhase,
    ClusterSpec, ClusterStatus, ContractReference, DynamicObject, Machine, MachineDeployment,
    MachineNodeReference, MachinePool, MachineSet, MachineSpec, MachineStatus, Resource,
    ResourceError, TypedResource, WorkerGroupSpec, CLUSTER_FINALIZER, CLUSTER_NAME_LABEL,
    MACHINE_CONTROL_PLANE_LABEL, OK_TO_DELETE_ANNOTATION,
};
pub use scheme::Scheme;
pub use types::{GroupVersionKind, ObjectKey, ResourceKey};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::Secret;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// Convert a typed resource into its JSON document
pub fn to_value<T: serde::Serialize>(resource: &T) -> Result<serde_json::Value> {
    serde_json::to_value(resource).map_err(|e| {
        KeelError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Decode a JSON document into a typed resource
pub fn from_value<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        KeelError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Serialize a resource to YAML
pub fn to_yaml<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_yaml::to_string(resource).map_err(|e| {
        KeelError::serialization_error(
            format!("Failed to serialize to YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from YAML
pub fn from_yaml<T: serde::de::DeserializeOwned>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        KeelError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_serialization() {
        let mut cluster = Cluster::new("default", "prod");
        cluster.spec.infrastructure_ref = Some(ContractReference::new(
            "infrastructure.cluster.x-k8s.io",
            "DockerCluster",
            "prod",
        ));

        let yaml = to_yaml(&cluster).unwrap();
        assert!(yaml.contains("infrastructureRef"));

        let deserialized: Cluster = from_yaml(&yaml).unwrap();
        assert_eq!(deserialized, cluster);
    }
}
