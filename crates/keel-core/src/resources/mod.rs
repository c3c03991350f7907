pub mod cluster;
pub mod dynamic;
pub mod groups;
pub mod machine;

pub use cluster::{
    Cluster, ClusterDeletionStatus, ClusterInitializationStatus, ClusterPhase, ClusterSpec,
    ClusterStatus, ContractReference,
};
pub use dynamic::DynamicObject;
pub use groups::{MachineDeployment, MachinePool, MachineSet, WorkerGroupSpec};
pub use machine::{Machine, MachineNodeReference, MachineSpec, MachineStatus};

use crate::{GroupVersionKind, ObjectKey, ResourceKey};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde::{de::DeserializeOwned, Serialize};

/// API group of the Cluster API kinds
pub const GROUP: &str = "cluster.x-k8s.io";
/// Served version of the Cluster API kinds
pub const VERSION: &str = "v1beta2";

/// Label carrying the owning cluster's name
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";
/// Label marking a Machine as part of the control plane (presence, any value)
pub const MACHINE_CONTROL_PLANE_LABEL: &str = "cluster.x-k8s.io/control-plane";
/// Annotation approving teardown of a deleting Cluster
pub const OK_TO_DELETE_ANNOTATION: &str = "runtime.cluster.x-k8s.io/ok-to-delete";
/// Finalizer held by the cluster controller
pub const CLUSTER_FINALIZER: &str = "cluster.cluster.x-k8s.io";

/// Base validation for all resources
pub fn validate_base(metadata: &ObjectMeta) -> Result<(), ResourceError> {
    match &metadata.name {
        None => Err(ResourceError::MissingField("metadata.name".to_string())),
        Some(name) if !is_valid_name(name) => Err(ResourceError::InvalidName(name.clone())),
        Some(_) => Ok(()),
    }
}

/// Trait for objects kept in the object store
pub trait Resource: Serialize + DeserializeOwned + Send + Sync {
    /// Get the API version of this resource
    fn api_version(&self) -> String;

    /// Get the kind of this resource
    fn kind(&self) -> String;

    /// Get the metadata of this resource
    fn metadata(&self) -> &ObjectMeta;

    /// Get mutable metadata
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Get the GroupVersionKind
    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version_kind(&self.api_version(), &self.kind())
            .unwrap_or_else(|_| GroupVersionKind::new("", self.api_version(), self.kind()))
    }

    /// Get the ResourceKey
    fn resource_key(&self) -> Result<ResourceKey, ResourceError> {
        let name = self
            .metadata()
            .name
            .as_ref()
            .ok_or_else(|| ResourceError::MissingField("metadata.name".to_string()))?;
        Ok(ResourceKey::new(self.gvk(), self.namespace(), name))
    }

    fn object_key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace(), self.name())
    }

    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    /// Whether the object has a deletion timestamp
    fn is_deleting(&self) -> bool {
        self.metadata().deletion_timestamp.is_some()
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.metadata()
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    fn has_label(&self, key: &str) -> bool {
        self.label(key).is_some()
    }

    fn has_annotation(&self, key: &str) -> bool {
        self.metadata()
            .annotations
            .as_ref()
            .is_some_and(|annotations| annotations.contains_key(key))
    }

    fn owner_references(&self) -> &[OwnerReference] {
        self.metadata().owner_references.as_deref().unwrap_or_default()
    }

    fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata()
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    /// Add a finalizer, returning false when it was already present
    fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.metadata_mut()
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(finalizer.to_string());
        true
    }

    /// Remove a finalizer, returning false when it was absent
    fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        if !self.has_finalizer(finalizer) {
            return false;
        }
        let metadata = self.metadata_mut();
        if let Some(finalizers) = metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
            if finalizers.is_empty() {
                metadata.finalizers = None;
            }
        }
        true
    }

    /// Validate the resource
    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(self.metadata())
    }
}

/// A resource whose kind is known at compile time
pub trait TypedResource: Resource {
    const GROUP: &'static str;
    const VERSION: &'static str;
    const KIND: &'static str;

    fn type_gvk() -> GroupVersionKind {
        GroupVersionKind::new(Self::GROUP, Self::VERSION, Self::KIND)
    }
}

/// Implement [`Resource`] and [`TypedResource`] for a struct with a `metadata: ObjectMeta` field
macro_rules! typed_resource {
    ($ty:ty, $group:expr, $version:expr, $kind:expr) => {
        impl $crate::resources::Resource for $ty {
            fn api_version(&self) -> String {
                <Self as $crate::resources::TypedResource>::type_gvk().api_version()
            }

            fn kind(&self) -> String {
                $kind.to_string()
            }

            fn metadata(&self) -> &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(
                &mut self,
            ) -> &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &mut self.metadata
            }
        }

        impl $crate::resources::TypedResource for $ty {
            const GROUP: &'static str = $group;
            const VERSION: &'static str = $version;
            const KIND: &'static str = $kind;
        }
    };
}

pub(crate) use typed_resource;

typed_resource!(k8s_openapi::api::core::v1::Secret, "", "v1", "Secret");

/// Resource-related errors
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),
}

/// Validate a resource name (DNS-1123 subdomain)
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    let bytes = name.as_bytes();
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    alnum(&bytes[0])
        && alnum(&bytes[bytes.len() - 1])
        && bytes.iter().all(|b| alnum(b) || *b == b'-' || *b == b'.')
}
