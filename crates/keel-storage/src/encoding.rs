use keel_core::{GroupVersionKind, ResourceKey};

/// Key under which the global resourceVersion counter lives
pub const RESOURCE_VERSION_KEY: &[u8] = b"meta/resource-version";

const REGISTRY_PREFIX: &str = "registry";
const CORE_GROUP: &str = "core";

/// Key encoder for storage keys.
///
/// Keys leave out the version, so one object is stored per group/kind/name
/// no matter which version a caller names:
/// `registry/{group}/{kind}/{namespace}/{name}`, with `core` standing in for the
/// empty group.
pub struct KeyEncoder;

impl KeyEncoder {
    pub fn encode_resource_key(key: &ResourceKey) -> String {
        format!(
            "{}{}",
            Self::encode_prefix(&key.gvk, Some(&key.namespace)),
            key.name
        )
    }

    /// Prefix for scanning a kind, optionally within one namespace
    pub fn encode_prefix(gvk: &GroupVersionKind, namespace: Option<&str>) -> String {
        let group = if gvk.group.is_empty() {
            CORE_GROUP
        } else {
            gvk.group.as_str()
        };
        match namespace {
            Some(ns) => format!("{}/{}/{}/{}/", REGISTRY_PREFIX, group, gvk.kind, ns),
            None => format!("{}/{}/{}/", REGISTRY_PREFIX, group, gvk.kind),
        }
    }

    /// Parse a storage key back to (group, kind, namespace, name)
    pub fn parse_key(key: &str) -> Option<(String, String, String, String)> {
        let mut parts = key.strip_prefix(REGISTRY_PREFIX)?.strip_prefix('/')?.split('/');
        let group = match parts.next()? {
            CORE_GROUP => String::new(),
            g => g.to_string(),
        };
        let kind = parts.next()?.to_string();
        let namespace = parts.next()?.to_string();
        let name = parts.next()?.to_string();
        if parts.next().is_some() {
            return None;
        }
        Some((group, kind, namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_resource_key_is_version_agnostic() {
        let v1 = GroupVersionKind::new("cluster.x-k8s.io", "v1beta1", "Cluster");
        let v2 = GroupVersionKind::new("cluster.x-k8s.io", "v1beta2", "Cluster");
        let a = KeyEncoder::encode_resource_key(&ResourceKey::new(v1, "default", "prod"));
        let b = KeyEncoder::encode_resource_key(&ResourceKey::new(v2, "default", "prod"));
        assert_eq!(a, "registry/cluster.x-k8s.io/Cluster/default/prod");
        assert_eq!(a, b);

        let secret = GroupVersionKind::new("", "v1", "Secret");
        assert_eq!(
            KeyEncoder::encode_resource_key(&ResourceKey::new(secret, "default", "prod-kubeconfig")),
            "registry/core/Secret/default/prod-kubeconfig"
        );
    }

    #[test]
    fn test_prefixes_do_not_overlap_between_kinds() {
        let machine = GroupVersionKind::new("cluster.x-k8s.io", "v1beta2", "Machine");
        let prefix = KeyEncoder::encode_prefix(&machine, None);
        let set = GroupVersionKind::new("cluster.x-k8s.io", "v1beta2", "MachineSet");
        let key = KeyEncoder::encode_resource_key(&ResourceKey::new(set, "default", "ms-1"));
        assert!(!key.starts_with(&prefix));
    }

    #[test]
    fn test_parse_key() {
        let (group, kind, namespace, name) =
            KeyEncoder::parse_key("registry/core/Secret/default/prod-kubeconfig").unwrap();
        assert_eq!(group, "");
        assert_eq!(kind, "Secret");
        assert_eq!(namespace, "default");
        assert_eq!(name, "prod-kubeconfig");

        assert!(KeyEncoder::parse_key("meta/resource-version").is_none());
        assert!(KeyEncoder::parse_key("registry/core/Secret/default").is_none());
    }
}
