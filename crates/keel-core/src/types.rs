use crate::error::{KeelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// GroupVersionKind uniquely identifies a resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// API group ("" for the core group)
    pub group: String,
    /// API version (e.g., "v1", "v1beta2")
    pub version: String,
    /// Resource kind (e.g., "Cluster", "MachineSet")
    pub kind: String,
}

impl GroupVersionKind {
    /// Create a new GVK
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Create a GVK from apiVersion and kind, rejecting malformed apiVersions.
    /// apiVersion format: "v1" or "group/version"
    pub fn from_api_version_kind(api_version: &str, kind: &str) -> Result<Self> {
        let (group, version) = split_api_version(api_version)?;
        Ok(Self::new(group, version, kind))
    }

    /// Get the apiVersion string (group/version or just version)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// Split an apiVersion into (group, version)
pub fn split_api_version(api_version: &str) -> Result<(&str, &str)> {
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    };

    if version.is_empty() || version.contains('/') || (api_version.contains('/') && group.is_empty())
    {
        return Err(KeelError::invalid_api_version(api_version));
    }

    Ok((group, version))
}

/// ResourceKey uniquely identifies a specific resource instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// GroupVersionKind of the resource
    pub gvk: GroupVersionKind,
    /// Namespace (empty for cluster-scoped resources)
    pub namespace: String,
    /// Resource name
    pub name: String,
}

impl ResourceKey {
    /// Create a new ResourceKey
    pub fn new(
        gvk: GroupVersionKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Check if this is a namespaced resource
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// The namespace/name part of the key
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_namespaced() {
            write!(f, "{}/{}/{}", self.gvk, self.namespace, self.name)
        } else {
            write!(f, "{}/{}", self.gvk, self.name)
        }
    }
}

/// Namespace/name identity of an object, used as the work-queue key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Attach a kind to this key
    pub fn with_gvk(&self, gvk: GroupVersionKind) -> ResourceKey {
        ResourceKey::new(gvk, &self.namespace, &self.name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gvk_from_api_version() {
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Secret").unwrap();
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.api_version(), "v1");

        let gvk =
            GroupVersionKind::from_api_version_kind("cluster.x-k8s.io/v1beta2", "Cluster").unwrap();
        assert_eq!(gvk.group, "cluster.x-k8s.io");
        assert_eq!(gvk.version, "v1beta2");
        assert_eq!(gvk.kind, "Cluster");
        assert_eq!(gvk.api_version(), "cluster.x-k8s.io/v1beta2");
    }

    #[test]
    fn test_malformed_api_versions() {
        assert!(split_api_version("").is_err());
        assert!(split_api_version("a/b/c").is_err());
        assert!(split_api_version("/v1").is_err());
        assert!(split_api_version("cluster.x-k8s.io/").is_err());
    }

    #[test]
    fn test_object_key_display() {
        let gvk = GroupVersionKind::new("cluster.x-k8s.io", "v1beta2", "Cluster");
        let key = ResourceKey::new(gvk, "default", "prod");
        assert_eq!(key.object_key().to_string(), "default/prod");
        assert_eq!(key.to_string(), "cluster.x-k8s.io/v1beta2/Cluster/default/prod");
    }
}
