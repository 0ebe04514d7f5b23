//! Object store abstraction for the reconciliation chain
//!
//! The reconciler never talks to the API server directly. It goes through an
//! injected [`ObjectStore`], which is implemented by [`KubeObjectStore`] in
//! production and by [`InMemoryStore`] in tests. Managed objects cross the
//! trait boundary as [`DynamicObject`]s so a single object-safe trait covers
//! every kind; [`to_dynamic`] and [`from_dynamic`] convert typed values.

mod kube_store;
mod memory;

use async_trait::async_trait;
use kube::api::DynamicObject;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use crate::crd::{Directus, DirectusStatus};
use crate::resources::ManagedKind;
use crate::Error;

pub use kube_store::KubeObjectStore;
pub use memory::{InMemoryStore, StoreOp, WriteRecord};

/// Fetch/create/update operations the reconciler performs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a Directus by identity, `None` if it does not exist
    async fn get_directus(&self, namespace: &str, name: &str) -> Result<Option<Directus>, Error>;

    /// Replace the status of a Directus
    async fn patch_directus_status(
        &self,
        namespace: &str,
        name: &str,
        status: &DirectusStatus,
    ) -> Result<(), Error>;

    /// Fetch a managed object, `None` if it does not exist
    async fn get(
        &self,
        kind: ManagedKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Create a managed object
    async fn create(
        &self,
        kind: ManagedKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error>;

    /// Replace an existing managed object
    ///
    /// The object must carry the resource version it was read at.
    async fn replace(
        &self,
        kind: ManagedKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error>;
}

/// Convert a typed object into a [`DynamicObject`]
pub fn to_dynamic<K: Serialize>(object: &K) -> Result<DynamicObject, Error> {
    let value = serde_json::to_value(object)?;
    Ok(serde_json::from_value(value)?)
}

/// Convert a [`DynamicObject`] into a typed object
pub fn from_dynamic<K: DeserializeOwned>(object: DynamicObject) -> Result<K, Error> {
    let value = serde_json::to_value(object)?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;

    #[test]
    fn typed_objects_survive_the_dynamic_boundary() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("blog-configmap".to_string()),
                namespace: Some("cms".to_string()),
                ..Default::default()
            },
            data: Some([("ADMIN_EMAIL".to_string(), "a@b.c".to_string())].into()),
            ..Default::default()
        };

        let dynamic = to_dynamic(&cm).unwrap();
        assert_eq!(dynamic.metadata.name.as_deref(), Some("blog-configmap"));
        let types = dynamic.types.as_ref().unwrap();
        assert_eq!(types.kind, "ConfigMap");
        assert_eq!(types.api_version, "v1");
        assert_eq!(dynamic.data["data"]["ADMIN_EMAIL"], "a@b.c");

        let back: ConfigMap = from_dynamic(dynamic).unwrap();
        assert_eq!(back, cm);
    }
}
