use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A single label requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    Exists(String),
}

/// Conjunction of label requirements; the empty selector matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements
            .push(Requirement::Equals(key.into(), value.into()));
        self
    }

    pub fn exists(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(Requirement::Exists(key.into()));
        self
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| match r {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            Requirement::Exists(k) => labels.contains_key(k),
        })
    }

    /// Match against `metadata.labels` of a stored document
    pub fn matches_object(&self, object: &Value) -> bool {
        if self.requirements.is_empty() {
            return true;
        }
        let labels: BTreeMap<String, String> = object
            .pointer("/metadata/labels")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        self.matches(&labels)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .requirements
            .iter()
            .map(|r| match r {
                Requirement::Equals(k, v) => format!("{}={}", k, v),
                Requirement::Exists(k) => k.clone(),
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selector_matching() {
        let object = json!({
            "metadata": {
                "labels": {
                    "cluster.x-k8s.io/cluster-name": "prod",
                    "cluster.x-k8s.io/control-plane": ""
                }
            }
        });

        assert!(LabelSelector::everything().matches_object(&json!({})));
        assert!(LabelSelector::everything()
            .eq("cluster.x-k8s.io/cluster-name", "prod")
            .exists("cluster.x-k8s.io/control-plane")
            .matches_object(&object));
        assert!(!LabelSelector::everything()
            .eq("cluster.x-k8s.io/cluster-name", "dev")
            .matches_object(&object));
        assert!(!LabelSelector::everything()
            .exists("missing")
            .matches_object(&object));
    }

    #[test]
    fn test_selector_display() {
        let selector = LabelSelector::everything().eq("a", "b").exists("c");
        assert_eq!(selector.to_string(), "a=b,c");
    }
}
