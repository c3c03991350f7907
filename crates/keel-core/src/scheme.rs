use crate::error::{KeelError, Result};
use crate::resources::{ContractReference, GROUP, VERSION};
use crate::types::GroupVersionKind;
use std::collections::HashMap;

/// Group prefix used by infrastructure providers
pub const INFRASTRUCTURE_GROUP: &str = "infrastructure.cluster.x-k8s.io";
/// Group prefix used by control plane providers
pub const CONTROL_PLANE_GROUP: &str = "controlplane.cluster.x-k8s.io";

/// Explicit table from (group, kind) to served version.
///
/// Contract references carry no version; the reconciler resolves them here.
/// Kind-level entries win over group-level defaults.
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    kinds: HashMap<(String, String), String>,
    groups: HashMap<String, String>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// The Cluster API kinds plus the conventional provider groups at v1beta2
    pub fn cluster_api_defaults() -> Self {
        Self::new()
            .with_group(GROUP, VERSION)
            .with_group(INFRASTRUCTURE_GROUP, VERSION)
            .with_group(CONTROL_PLANE_GROUP, VERSION)
    }

    /// Serve every kind of `group` at `version`
    pub fn with_group(mut self, group: impl Into<String>, version: impl Into<String>) -> Self {
        self.groups.insert(group.into(), version.into());
        self
    }

    /// Serve one kind at `version`
    pub fn with_kind(
        mut self,
        group: impl Into<String>,
        kind: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.kinds
            .insert((group.into(), kind.into()), version.into());
        self
    }

    pub fn version_for(&self, group: &str, kind: &str) -> Option<&str> {
        self.kinds
            .get(&(group.to_string(), kind.to_string()))
            .or_else(|| self.groups.get(group))
            .map(String::as_str)
    }

    /// Resolve a contract reference into a fully qualified kind
    pub fn resolve(&self, reference: &ContractReference) -> Result<GroupVersionKind> {
        reference.validate()?;
        let version = self
            .version_for(&reference.api_group, &reference.kind)
            .ok_or_else(|| KeelError::unknown_kind(&reference.api_group, &reference.kind))?;
        Ok(GroupVersionKind::new(
            &reference.api_group,
            version,
            &reference.kind,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_group_default() {
        let scheme = Scheme::cluster_api_defaults();
        let gvk = scheme
            .resolve(&ContractReference::new(INFRASTRUCTURE_GROUP, "DockerCluster", "prod"))
            .unwrap();
        assert_eq!(gvk.api_version(), "infrastructure.cluster.x-k8s.io/v1beta2");
        assert_eq!(gvk.kind, "DockerCluster");
    }

    #[test]
    fn test_kind_entry_overrides_group() {
        let scheme = Scheme::cluster_api_defaults().with_kind(
            INFRASTRUCTURE_GROUP,
            "LegacyCluster",
            "v1beta1",
        );
        let gvk = scheme
            .resolve(&ContractReference::new(INFRASTRUCTURE_GROUP, "LegacyCluster", "x"))
            .unwrap();
        assert_eq!(gvk.version, "v1beta1");
    }

    #[test]
    fn test_unknown_group_and_malformed_reference() {
        let scheme = Scheme::cluster_api_defaults();
        let err = scheme
            .resolve(&ContractReference::new("example.io", "FooCluster", "x"))
            .unwrap_err();
        assert!(matches!(err, KeelError::UnknownKind { .. }));

        let err = scheme
            .resolve(&ContractReference::new(INFRASTRUCTURE_GROUP, "", "x"))
            .unwrap_err();
        assert!(matches!(err, KeelError::InvalidReference { .. }));
    }
}
