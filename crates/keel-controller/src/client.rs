use crate::error::{ControllerError, Result};
use keel_core::{DynamicObject, ObjectKey, ResourceKey, TypedResource};
use keel_storage::{LabelSelector, ObjectStore, PatchParams};
use std::sync::Arc;
use tracing::{debug, warn};

/// Typed access to the object store
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn ObjectStore>,
}

impl Client {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub async fn get<T: TypedResource>(&self, key: &ObjectKey) -> Result<T> {
        let value = self.store.get(&key.with_gvk(T::type_gvk())).await?;
        Ok(keel_core::from_value(value)?)
    }

    /// Like [`Client::get`], with not-found mapped to `None`
    pub async fn get_opt<T: TypedResource>(&self, key: &ObjectKey) -> Result<Option<T>> {
        match self.get(key).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch an object of a kind only known at runtime; not-found is `None`
    pub async fn get_dynamic(&self, key: &ResourceKey) -> Result<Option<DynamicObject>> {
        match self.store.get(key).await {
            Ok(value) => Ok(Some(keel_core::from_value(value)?)),
            Err(e) => match ControllerError::from(e) {
                e if e.is_not_found() => Ok(None),
                e => Err(e),
            },
        }
    }

    /// List objects of `T`. Objects that do not decode as `T` are logged and skipped.
    pub async fn list<T: TypedResource>(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<T>> {
        let gvk = T::type_gvk();
        let values = self.store.list(&gvk, namespace, selector).await?;
        let mut objects = Vec::with_capacity(values.len());
        for value in values {
            let name = value
                .pointer("/metadata/name")
                .and_then(|name| name.as_str())
                .unwrap_or("<unnamed>")
                .to_string();
            match keel_core::from_value::<T>(value) {
                Ok(obj) => objects.push(obj),
                Err(e) => warn!("Skipping undecodable {} {}: {}", gvk.kind, name, e),
            }
        }
        Ok(objects)
    }

    pub async fn create<T: TypedResource>(&self, obj: &T) -> Result<T> {
        obj.validate().map_err(keel_core::KeelError::from)?;
        let key = obj.resource_key().map_err(keel_core::KeelError::from)?;
        let value = self.store.create(&key, keel_core::to_value(obj)?).await?;
        Ok(keel_core::from_value(value)?)
    }

    pub async fn patch<T: TypedResource>(
        &self,
        key: &ObjectKey,
        patch: &json_patch::Patch,
        params: &PatchParams,
    ) -> Result<T> {
        let value = self
            .store
            .patch(&key.with_gvk(T::type_gvk()), patch, params)
            .await?;
        Ok(keel_core::from_value(value)?)
    }

    /// Issue a delete; returns false when the object was already gone
    pub async fn delete(&self, key: &ResourceKey) -> Result<bool> {
        match self.store.delete(key).await {
            Ok(()) => Ok(true),
            Err(e) => match ControllerError::from(e) {
                e if e.is_not_found() => {
                    debug!("{} already gone", key);
                    Ok(false)
                }
                e => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{Machine, ObjectMeta, CLUSTER_NAME_LABEL};
    use keel_storage::{KvObjectStore, RedbBackend, StoreConfig};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_list_skips_undecodable_objects() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(RedbBackend::new(dir.path().join("test.redb")).unwrap());
        let client = Client::new(Arc::new(KvObjectStore::new(backend, StoreConfig::default())));

        let machine = Machine {
            metadata: ObjectMeta {
                name: Some("good".to_string()),
                namespace: Some("default".to_string()),
                labels: Some(BTreeMap::from([(
                    CLUSTER_NAME_LABEL.to_string(),
                    "prod".to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };
        client.create(&machine).await.unwrap();
        client
            .store()
            .create(
                &ResourceKey::new(Machine::type_gvk(), "default", "bad"),
                serde_json::json!({
                    "metadata": {
                        "labels": {CLUSTER_NAME_LABEL: "prod"},
                        "ownerReferences": [{
                            "apiVersion": "cluster.x-k8s.io/v1beta2",
                            "kind": "Cluster",
                            "name": 7
                        }]
                    },
                    "spec": {"clusterName": "prod"}
                }),
            )
            .await
            .unwrap();

        let selector = LabelSelector::everything().eq(CLUSTER_NAME_LABEL, "prod");
        let machines = client
            .list::<Machine>(Some("default"), &selector)
            .await
            .unwrap();
        let names: Vec<_> = machines.iter().map(|m| m.metadata.name.as_deref()).collect();
        assert_eq!(names, vec![Some("good")]);
    }
}
