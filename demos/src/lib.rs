//! Shared plumbing for the demo controllers
//!
//! [`KubeSource`] adapts a [`kube::Api`] over dynamic objects to the [`ResourceSource`] a
//! kontroller reflector consumes.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use kontroller::{
    runtime::{BoxError, WatchStream},
    ObjectList, ResourceObject, ResourceSource, ResourceVersion, SourceError, WatchEvent,
};
use kube::{
    api::{Api, ListParams, WatchParams},
    core::{ApiResource, DynamicObject},
    Client, Resource,
};
use tracing::warn;

/// Server-side timeout of a single watch call, in seconds
///
/// The apiserver closes the stream after this long, and the reflector relists.
const WATCH_TIMEOUT: u32 = 290;

/// Lists and watches one kind across all namespaces
#[derive(Clone)]
pub struct KubeSource {
    api: Api<DynamicObject>,
    resource: ApiResource,
}

impl KubeSource {
    /// Watch every `K` the client can see
    pub fn all<K: Resource<DynamicType = ()>>(client: Client) -> Self {
        let resource = ApiResource::erase::<K>(&());
        Self {
            api: Api::all_with(client, &resource),
            resource,
        }
    }
}

fn decode(obj: DynamicObject) -> Result<ResourceObject, BoxError> {
    let value = serde_json::to_value(obj)?;
    Ok(ResourceObject::from_value(value)?)
}

/// Decode listed objects, logging and skipping the ones that cannot be decoded
fn decode_items(kind: &str, items: Vec<DynamicObject>) -> Vec<ResourceObject> {
    items
        .into_iter()
        .filter_map(|obj| {
            let name = obj.metadata.name.clone().unwrap_or_default();
            decode(obj)
                .map_err(|err| warn!(%kind, %name, error = %err, "skipping undecodable object"))
                .ok()
        })
        .collect()
}

/// Re-decode a kube watch event through the shared wire format
fn convert(event: kube::core::WatchEvent<DynamicObject>) -> Result<WatchEvent, SourceError> {
    serde_json::to_value(event)
        .and_then(serde_json::from_value)
        .map_err(SourceError::new)
}

#[async_trait]
impl ResourceSource for KubeSource {
    fn name(&self) -> String {
        format!("{}/{}", self.resource.api_version, self.resource.plural)
    }

    async fn list(&self) -> Result<ObjectList, SourceError> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(SourceError::new)?;
        let resource_version = list
            .metadata
            .resource_version
            .as_deref()
            .unwrap_or_default()
            .parse::<ResourceVersion>()
            .map_err(SourceError::new)?;
        let items = decode_items(&self.resource.kind, list.items);
        Ok(ObjectList {
            kind: format!("{}List", self.resource.kind),
            api_version: self.resource.api_version.clone(),
            resource_version,
            items,
        })
    }

    async fn watch(&self, from: ResourceVersion) -> Result<WatchStream, SourceError> {
        let params = WatchParams::default().timeout(WATCH_TIMEOUT);
        let stream = self
            .api
            .watch(&params, &from.to_string())
            .await
            .map_err(SourceError::new)?;
        Ok(stream
            .map_err(SourceError::new)
            .and_then(|event| futures::future::ready(convert(event)))
            .boxed())
    }
}
