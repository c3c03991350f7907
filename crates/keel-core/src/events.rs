use crate::types::{GroupVersionKind, ObjectKey, ResourceKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// One committed change in the object store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub event_type: WatchEventType,
    pub gvk: GroupVersionKind,
    pub resource_key: ResourceKey,
    /// Object after the change; for DELETED the last stored state
    pub object: Value,
    /// Store revision that produced the event
    pub resource_version: String,
}

impl ResourceEvent {
    pub fn new(
        event_type: WatchEventType,
        resource_key: ResourceKey,
        object: Value,
        resource_version: String,
    ) -> Self {
        Self {
            event_type,
            gvk: resource_key.gvk.clone(),
            resource_key,
            object,
            resource_version,
        }
    }

    pub fn added(key: ResourceKey, object: Value, resource_version: String) -> Self {
        Self::new(WatchEventType::Added, key, object, resource_version)
    }

    pub fn modified(key: ResourceKey, object: Value, resource_version: String) -> Self {
        Self::new(WatchEventType::Modified, key, object, resource_version)
    }

    pub fn deleted(key: ResourceKey, object: Value, resource_version: String) -> Self {
        Self::new(WatchEventType::Deleted, key, object, resource_version)
    }

    pub fn is_deleted(&self) -> bool {
        self.event_type == WatchEventType::Deleted
    }

    /// Namespace and name of the changed object
    pub fn object_key(&self) -> ObjectKey {
        self.resource_key.object_key()
    }

    /// Decode the payload into a typed object
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        crate::from_value(self.object.clone())
    }
}
