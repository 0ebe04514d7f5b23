//! Object store backed by the Kubernetes API server

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::trace;

use super::ObjectStore;
use crate::crd::{Directus, DirectusStatus};
use crate::resources::ManagedKind;
use crate::{Error, FIELD_MANAGER};

/// API resource descriptor for a managed kind
pub fn api_resource(kind: ManagedKind) -> ApiResource {
    match kind {
        ManagedKind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
        ManagedKind::Secret => ApiResource::erase::<Secret>(&()),
        ManagedKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
        ManagedKind::Service => ApiResource::erase::<Service>(&()),
        ManagedKind::Deployment => ApiResource::erase::<Deployment>(&()),
        ManagedKind::Ingress => ApiResource::erase::<Ingress>(&()),
        ManagedKind::HorizontalPodAutoscaler => ApiResource::erase::<HorizontalPodAutoscaler>(&()),
    }
}

/// Real object store using a kube [`Client`]
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    /// Create a new KubeObjectStore wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ManagedKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &api_resource(kind))
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_directus(&self, namespace: &str, name: &str) -> Result<Option<Directus>, Error> {
        let api: Api<Directus> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(directus) => Ok(Some(directus)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_directus_status(
        &self,
        namespace: &str,
        name: &str,
        status: &DirectusStatus,
    ) -> Result<(), Error> {
        let api: Api<Directus> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }

    async fn get(
        &self,
        kind: ManagedKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        trace!(%kind, %namespace, %name, "get");
        match self.api(kind, namespace).get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(
        &self,
        kind: ManagedKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        trace!(%kind, %namespace, "create");
        Ok(self
            .api(kind, namespace)
            .create(&PostParams::default(), object)
            .await?)
    }

    async fn replace(
        &self,
        kind: ManagedKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = object
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::missing_field(format!("metadata.name of {kind}")))?;
        trace!(%kind, %namespace, %name, "replace");
        Ok(self
            .api(kind, namespace)
            .replace(name, &PostParams::default(), object)
            .await?)
    }
}
