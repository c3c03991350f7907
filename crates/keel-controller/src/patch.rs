use crate::client::Client;
use crate::error::Result;
use json_patch::Patch;
use keel_core::{Resource, TypedResource};
use keel_storage::PatchParams;
use serde_json::{Map, Value};
use tracing::debug;

/// Snapshot-and-diff writer.
///
/// Take a snapshot with [`PatchHelper::new`], mutate the object freely, then
/// call [`PatchHelper::patch`]: the status half and the rest of the object are
/// diffed independently and each non-empty diff is written as its own JSON
/// patch, status first. Both writes carry a resourceVersion precondition, so a
/// concurrent writer turns into a conflict instead of a lost update.
pub struct PatchHelper {
    main: Value,
    status: Value,
    resource_version: Option<String>,
}

impl PatchHelper {
    pub fn new<T: Resource>(obj: &T) -> Result<Self> {
        let (main, status) = split(keel_core::to_value(obj)?);
        Ok(Self {
            main,
            status,
            resource_version: obj.metadata().resource_version.clone(),
        })
    }

    /// Write the changes made since the snapshot.
    ///
    /// Returns the stored object after the last write, or `None` when there was
    /// nothing to write.
    pub async fn patch<T: TypedResource>(&self, client: &Client, obj: &T) -> Result<Option<T>> {
        let (main, status) = split(keel_core::to_value(obj)?);
        let status_patch = json_patch::diff(&self.status, &status);
        let main_patch = json_patch::diff(&self.main, &main);

        let key = obj.object_key();
        let mut resource_version = self.resource_version.clone();
        let mut latest: Option<T> = None;

        for (patch, params) in [
            (status_patch, PatchParams::status()),
            (main_patch, PatchParams::default()),
        ] {
            if is_empty(&patch) {
                continue;
            }
            debug!(
                "Patching {} {} ({:?}, {} ops)",
                T::KIND,
                key,
                params.subresource,
                patch.0.len()
            );
            let updated: T = client
                .patch(
                    &key,
                    &patch,
                    &params.with_resource_version(resource_version.clone()),
                )
                .await?;
            resource_version = updated.metadata().resource_version.clone();
            latest = Some(updated);
        }

        Ok(latest)
    }
}

fn is_empty(patch: &Patch) -> bool {
    patch.0.is_empty()
}

/// Split a document into (everything but status, {"status": ...})
fn split(mut doc: Value) -> (Value, Value) {
    let mut status_doc = Map::new();
    if let Some(status) = doc.as_object_mut().and_then(|m| m.remove("status")) {
        status_doc.insert("status".to_string(), status);
    }
    (doc, Value::Object(status_doc))
}
