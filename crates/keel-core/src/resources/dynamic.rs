use super::Resource;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An object whose shape is only known at runtime, such as a provider's
/// infrastructure or control plane object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicObject {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Resource for DynamicObject {
    fn api_version(&self) -> String {
        self.api_version.clone()
    }

    fn kind(&self) -> String {
        self.kind.clone()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl DynamicObject {
    /// Walk a dotted path below the top level, e.g. `["status", "ready"]`
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.data.get(*first)?, |value, segment| value.get(segment))
    }

    pub fn bool_field(&self, path: &[&str]) -> Option<bool> {
        self.field(path).and_then(Value::as_bool)
    }

    /// Status and message of a condition in `status.conditions`
    pub fn status_condition(&self, type_: &str) -> Option<(bool, Option<String>)> {
        self.field(&["status", "conditions"])?
            .as_array()?
            .iter()
            .find(|c| c.get("type").and_then(Value::as_str) == Some(type_))
            .map(|c| {
                (
                    c.get("status").and_then(Value::as_str) == Some("True"),
                    c.get("message")
                        .and_then(Value::as_str)
                        .filter(|m| !m.is_empty())
                        .map(str::to_string),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_access() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta2",
            "kind": "DockerCluster",
            "metadata": {"name": "prod", "namespace": "default"},
            "status": {
                "initialization": {"provisioned": true},
                "conditions": [
                    {"type": "Ready", "status": "False", "message": "load balancer pending"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(obj.gvk().group, "infrastructure.cluster.x-k8s.io");
        assert_eq!(obj.bool_field(&["status", "initialization", "provisioned"]), Some(true));
        assert_eq!(obj.bool_field(&["status", "ready"]), None);
        assert_eq!(
            obj.status_condition("Ready"),
            Some((false, Some("load balancer pending".to_string())))
        );
        assert_eq!(obj.status_condition("Missing"), None);
    }
}
