use crate::encoding::{KeyEncoder, RESOURCE_VERSION_KEY};
use crate::{KVStore, LabelSelector, Result, StorageError, Transaction};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use keel_core::{GroupVersionKind, ResourceEvent, ResourceKey};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Which half of an object a patch may touch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Subresource {
    /// Everything except `status`
    #[default]
    Main,
    /// Only `status`
    Status,
}

#[derive(Debug, Clone, Default)]
pub struct PatchParams {
    pub subresource: Subresource,
    /// Optimistic-concurrency precondition; a mismatch fails with a conflict
    pub resource_version: Option<String>,
}

impl PatchParams {
    pub fn status() -> Self {
        Self {
            subresource: Subresource::Status,
            ..Default::default()
        }
    }

    pub fn with_resource_version(mut self, resource_version: Option<String>) -> Self {
        self.resource_version = resource_version;
        self
    }
}

/// Configuration for the object store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the watch broadcast channel
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            event_capacity: 4096,
        }
    }
}

/// Declarative object store consumed by the controller
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object; `KeyNotFound` when absent
    async fn get(&self, key: &ResourceKey) -> Result<Value>;

    /// List objects of a kind, optionally within one namespace, in name order
    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>>;

    /// Create a new object; `AlreadyExists` when the key is taken
    async fn create(&self, key: &ResourceKey, object: Value) -> Result<Value>;

    /// Apply an RFC 6902 patch to the main object or its status
    async fn patch(
        &self,
        key: &ResourceKey,
        patch: &json_patch::Patch,
        params: &PatchParams,
    ) -> Result<Value>;

    /// Delete an object. Objects with finalizers are only marked with a
    /// deletionTimestamp and removed once the last finalizer is patched away.
    async fn delete(&self, key: &ResourceKey) -> Result<()>;

    /// Subscribe to change events for every kind
    fn watch(&self) -> broadcast::Receiver<ResourceEvent>;
}

/// [`ObjectStore`] over any [`KVStore`]
pub struct KvObjectStore {
    kv: Arc<dyn KVStore>,
    events: broadcast::Sender<ResourceEvent>,
}

impl KvObjectStore {
    pub fn new(kv: Arc<dyn KVStore>, config: StoreConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self { kv, events }
    }

    fn publish(&self, event: ResourceEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl ObjectStore for KvObjectStore {
    async fn get(&self, key: &ResourceKey) -> Result<Value> {
        let storage_key = KeyEncoder::encode_resource_key(key);
        let data = self
            .kv
            .get(storage_key.as_bytes())?
            .ok_or_else(|| StorageError::key_not_found(key.to_string()))?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>> {
        let prefix = KeyEncoder::encode_prefix(gvk, namespace);
        let mut objects = Vec::new();
        for (_, data) in self.kv.scan(prefix.as_bytes())? {
            let object: Value = serde_json::from_slice(&data)?;
            if selector.matches_object(&object) {
                objects.push(object);
            }
        }
        debug!(
            "Listed {} {} objects (selector: '{}')",
            objects.len(),
            gvk.kind,
            selector
        );
        Ok(objects)
    }

    async fn create(&self, key: &ResourceKey, mut object: Value) -> Result<Value> {
        let storage_key = KeyEncoder::encode_resource_key(key);
        let mut txn = self.kv.transaction()?;

        if txn.get(storage_key.as_bytes())?.is_some() {
            return Err(StorageError::already_exists(key.to_string()));
        }

        let resource_version = next_resource_version(txn.as_mut())?;
        {
            let root = as_map(&mut object, key)?;
            root.insert("apiVersion".into(), key.gvk.api_version().into());
            root.insert("kind".into(), key.gvk.kind.clone().into());
        }
        let meta = metadata_mut(&mut object, key)?;
        meta.insert("name".into(), key.name.clone().into());
        if key.is_namespaced() {
            meta.insert("namespace".into(), key.namespace.clone().into());
        }
        meta.insert("uid".into(), Uuid::new_v4().to_string().into());
        meta.insert("creationTimestamp".into(), now().into());
        meta.insert("generation".into(), 1.into());
        meta.insert("resourceVersion".into(), resource_version.clone().into());
        meta.remove("deletionTimestamp");

        txn.put(storage_key.as_bytes(), &serde_json::to_vec(&object)?)?;
        txn.commit()?;

        info!("Created {} at resourceVersion {}", key, resource_version);
        self.publish(ResourceEvent::added(
            key.clone(),
            object.clone(),
            resource_version,
        ));
        Ok(object)
    }

    async fn patch(
        &self,
        key: &ResourceKey,
        patch: &json_patch::Patch,
        params: &PatchParams,
    ) -> Result<Value> {
        let storage_key = KeyEncoder::encode_resource_key(key);
        let mut txn = self.kv.transaction()?;

        let current: Value = match txn.get(storage_key.as_bytes())? {
            Some(data) => serde_json::from_slice(&data)?,
            None => return Err(StorageError::key_not_found(key.to_string())),
        };

        let current_version = str_at(&current, "/metadata/resourceVersion").to_string();
        if let Some(expected) = &params.resource_version {
            if *expected != current_version {
                return Err(StorageError::conflict(
                    key.to_string(),
                    expected,
                    current_version,
                ));
            }
        }

        let mut patched = current.clone();
        json_patch::patch(&mut patched, &patch.0)
            .map_err(|e| StorageError::invalid_patch(key.to_string(), e.to_string()))?;

        let mut updated = match params.subresource {
            Subresource::Status => {
                let mut updated = current.clone();
                copy_field(&mut updated, &patched, "status", key)?;
                updated
            }
            Subresource::Main => {
                let mut updated = patched;
                copy_field(&mut updated, &current, "status", key)?;
                copy_field(&mut updated, &current, "apiVersion", key)?;
                copy_field(&mut updated, &current, "kind", key)?;
                let current_meta = current.get("metadata").cloned().unwrap_or_default();
                let meta = metadata_mut(&mut updated, key)?;
                for field in [
                    "name",
                    "namespace",
                    "uid",
                    "creationTimestamp",
                    "deletionTimestamp",
                    "generation",
                    "resourceVersion",
                ] {
                    match current_meta.get(field) {
                        Some(value) => meta.insert(field.into(), value.clone()),
                        None => meta.remove(field),
                    };
                }
                if updated.get("spec") != current.get("spec") {
                    let generation = current
                        .pointer("/metadata/generation")
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    metadata_mut(&mut updated, key)?.insert("generation".into(), (generation + 1).into());
                }
                updated
            }
        };

        if updated == current {
            debug!("Patch of {} changed nothing", key);
            txn.rollback()?;
            return Ok(current);
        }

        let resource_version = next_resource_version(txn.as_mut())?;
        metadata_mut(&mut updated, key)?
            .insert("resourceVersion".into(), resource_version.clone().into());

        if is_deleting(&updated) && finalizers_empty(&updated) {
            txn.delete(storage_key.as_bytes())?;
            txn.commit()?;
            info!("Removed {} after its last finalizer was cleared", key);
            self.publish(ResourceEvent::deleted(
                key.clone(),
                updated.clone(),
                resource_version,
            ));
            return Ok(updated);
        }

        txn.put(storage_key.as_bytes(), &serde_json::to_vec(&updated)?)?;
        txn.commit()?;

        debug!("Patched {} to resourceVersion {}", key, resource_version);
        self.publish(ResourceEvent::modified(
            key.clone(),
            updated.clone(),
            resource_version,
        ));
        Ok(updated)
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        let storage_key = KeyEncoder::encode_resource_key(key);
        let mut txn = self.kv.transaction()?;

        let mut current: Value = match txn.get(storage_key.as_bytes())? {
            Some(data) => serde_json::from_slice(&data)?,
            None => return Err(StorageError::key_not_found(key.to_string())),
        };

        if !finalizers_empty(&current) {
            if is_deleting(&current) {
                debug!("{} is already being deleted", key);
                return Ok(());
            }

            let resource_version = next_resource_version(txn.as_mut())?;
            let meta = metadata_mut(&mut current, key)?;
            meta.insert("deletionTimestamp".into(), now().into());
            meta.insert("resourceVersion".into(), resource_version.clone().into());
            txn.put(storage_key.as_bytes(), &serde_json::to_vec(&current)?)?;
            txn.commit()?;

            info!("Marked {} for deletion, waiting on finalizers", key);
            self.publish(ResourceEvent::modified(
                key.clone(),
                current,
                resource_version,
            ));
            return Ok(());
        }

        let resource_version = next_resource_version(txn.as_mut())?;
        txn.delete(storage_key.as_bytes())?;
        txn.commit()?;

        info!("Deleted {}", key);
        self.publish(ResourceEvent::deleted(
            key.clone(),
            current,
            resource_version,
        ));
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<ResourceEvent> {
        self.events.subscribe()
    }
}

fn next_resource_version(txn: &mut dyn Transaction) -> Result<String> {
    let current = match txn.get(RESOURCE_VERSION_KEY)? {
        Some(data) => String::from_utf8_lossy(&data).parse::<u64>().map_err(|e| {
            StorageError::serialization_error("Corrupt resourceVersion counter", Some(Box::new(e)))
        })?,
        None => 0,
    };
    let next = (current + 1).to_string();
    txn.put(RESOURCE_VERSION_KEY, next.as_bytes())?;
    Ok(next)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn as_map<'a>(object: &'a mut Value, key: &ResourceKey) -> Result<&'a mut Map<String, Value>> {
    object.as_object_mut().ok_or_else(|| {
        StorageError::serialization_error(format!("{} is not a JSON object", key), None)
    })
}

fn metadata_mut<'a>(
    object: &'a mut Value,
    key: &ResourceKey,
) -> Result<&'a mut Map<String, Value>> {
    as_map(object, key)?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| {
            StorageError::serialization_error(format!("{} has a malformed metadata section", key), None)
        })
}

/// Make `target[field]` equal `source[field]`, removing it when the source has none
fn copy_field(target: &mut Value, source: &Value, field: &str, key: &ResourceKey) -> Result<()> {
    let root = as_map(target, key)?;
    match source.get(field) {
        Some(value) => root.insert(field.to_string(), value.clone()),
        None => root.remove(field),
    };
    Ok(())
}

fn str_at<'a>(object: &'a Value, pointer: &str) -> &'a str {
    object.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

fn is_deleting(object: &Value) -> bool {
    object
        .pointer("/metadata/deletionTimestamp")
        .is_some_and(|v| !v.is_null())
}

fn finalizers_empty(object: &Value) -> bool {
    object
        .pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .is_none_or(|f| f.is_empty())
}
