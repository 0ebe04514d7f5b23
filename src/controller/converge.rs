//! Convergence table for the managed kinds
//!
//! Each managed kind is one [`ManagedResource`] entry: the synthesizer that
//! builds the desired object and the merge policy that folds it into the
//! object found in the store. The blanket [`ConvergeStep`] impl turns every
//! entry into the same fetch, then create or merge, then replace sequence,
//! so adding a managed kind means adding an entry to [`default_steps`].

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount, ServiceSpec};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::crd::Directus;
use crate::ownership::attach_owner;
use crate::resources::{
    desired_autoscaler, desired_config_map, desired_deployment, desired_ingress, desired_secret,
    desired_service, desired_service_account, CredentialGenerator, ManagedKind, RandomCredentials,
};
use crate::store::{from_dynamic, to_dynamic, ObjectStore};
use crate::Error;

/// What a converge step did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Convergence {
    /// The kind's precondition is off, nothing was fetched or written
    Skipped,
    /// The object did not exist and was created
    Created,
    /// The object existed and was replaced with the merged value
    Updated,
    /// The object existed and already matched
    Unchanged,
}

/// One managed kind: how to synthesize it and how to merge it on update
pub trait ManagedResource: Send + Sync {
    /// Typed object this entry manages
    type Object: Resource<DynamicType = ()>
        + Clone
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync;

    /// Kind written to the store
    fn kind(&self) -> ManagedKind;

    /// Desired object for `directus`, or `None` when the kind is disabled
    fn desired(&self, directus: &Directus) -> Option<Self::Object>;

    /// Fold `desired` into `found`, or `None` to leave `found` untouched
    ///
    /// The result keeps `found`'s metadata; labels and ownership are merged
    /// by the caller.
    fn merge(&self, found: &Self::Object, desired: Self::Object) -> Option<Self::Object>;
}

/// Object-safe converge operation over a [`ManagedResource`]
#[async_trait]
pub trait ConvergeStep: Send + Sync {
    /// Kind this step converges
    fn managed_kind(&self) -> ManagedKind;

    /// Bring the store's object of this kind in line with `directus`
    async fn converge(
        &self,
        store: &dyn ObjectStore,
        directus: &Directus,
        owner: &OwnerReference,
    ) -> Result<Convergence, Error>;
}

/// Merge the desired labels and owner edge into the found metadata
fn merge_metadata(meta: &mut ObjectMeta, desired: &ObjectMeta) {
    if let Some(labels) = &desired.labels {
        let current = meta.labels.get_or_insert_with(Default::default);
        for (k, v) in labels {
            current.insert(k.clone(), v.clone());
        }
    }
    for owner in desired.owner_references.iter().flatten() {
        attach_owner(meta, owner);
    }
}

#[async_trait]
impl<R: ManagedResource> ConvergeStep for R {
    fn managed_kind(&self) -> ManagedKind {
        self.kind()
    }

    async fn converge(
        &self,
        store: &dyn ObjectStore,
        directus: &Directus,
        owner: &OwnerReference,
    ) -> Result<Convergence, Error> {
        let kind = self.kind();
        let Some(mut desired) = self.desired(directus) else {
            debug!(%kind, "precondition off, skipping");
            return Ok(Convergence::Skipped);
        };
        attach_owner(desired.meta_mut(), owner);

        let namespace = directus
            .namespace()
            .ok_or_else(|| Error::missing_field("metadata.namespace of Directus"))?;
        let name = desired
            .meta()
            .name
            .clone()
            .ok_or_else(|| Error::missing_field(format!("metadata.name of {kind}")))?;

        let Some(found) = store.get(kind, &namespace, &name).await? else {
            store.create(kind, &namespace, &to_dynamic(&desired)?).await?;
            info!(%kind, %name, "created");
            return Ok(Convergence::Created);
        };

        let found: R::Object = from_dynamic(found)?;
        let desired_meta = desired.meta().clone();
        let Some(mut merged) = self.merge(&found, desired) else {
            debug!(%kind, %name, "exists, left untouched");
            return Ok(Convergence::Unchanged);
        };
        merge_metadata(merged.meta_mut(), &desired_meta);

        if merged == found {
            debug!(%kind, %name, "up to date");
            return Ok(Convergence::Unchanged);
        }

        store
            .replace(kind, &namespace, &to_dynamic(&merged)?)
            .await?;
        info!(%kind, %name, "updated");
        Ok(Convergence::Updated)
    }
}

// =============================================================================
// Table entries
// =============================================================================

/// Access identity; replaces annotations on update
pub struct AccessIdentity;

impl ManagedResource for AccessIdentity {
    type Object = ServiceAccount;

    fn kind(&self) -> ManagedKind {
        ManagedKind::ServiceAccount
    }

    fn desired(&self, directus: &Directus) -> Option<ServiceAccount> {
        desired_service_account(directus)
    }

    fn merge(&self, found: &ServiceAccount, desired: ServiceAccount) -> Option<ServiceAccount> {
        let mut merged = found.clone();
        merged.metadata.annotations = desired.metadata.annotations;
        Some(merged)
    }
}

/// Application secret; never updated once it exists
pub struct ApplicationSecret {
    credentials: Arc<dyn CredentialGenerator>,
}

impl ApplicationSecret {
    /// Entry drawing new credentials from `credentials`
    pub fn new(credentials: Arc<dyn CredentialGenerator>) -> Self {
        Self { credentials }
    }
}

impl Default for ApplicationSecret {
    fn default() -> Self {
        Self::new(Arc::new(RandomCredentials))
    }
}

impl ManagedResource for ApplicationSecret {
    type Object = Secret;

    fn kind(&self) -> ManagedKind {
        ManagedKind::Secret
    }

    fn desired(&self, directus: &Directus) -> Option<Secret> {
        if !directus.spec.create_application_secret {
            return None;
        }
        desired_secret(directus, &self.credentials.generate())
    }

    fn merge(&self, _found: &Secret, _desired: Secret) -> Option<Secret> {
        None
    }
}

/// Configuration; full data replacement
pub struct Configuration;

impl ManagedResource for Configuration {
    type Object = ConfigMap;

    fn kind(&self) -> ManagedKind {
        ManagedKind::ConfigMap
    }

    fn desired(&self, directus: &Directus) -> Option<ConfigMap> {
        Some(desired_config_map(directus))
    }

    fn merge(&self, found: &ConfigMap, desired: ConfigMap) -> Option<ConfigMap> {
        let mut merged = found.clone();
        merged.data = desired.data;
        Some(merged)
    }
}

/// Exposure; replaces type, ports and selector only
pub struct Exposure;

impl ManagedResource for Exposure {
    type Object = Service;

    fn kind(&self) -> ManagedKind {
        ManagedKind::Service
    }

    fn desired(&self, directus: &Directus) -> Option<Service> {
        Some(desired_service(directus))
    }

    fn merge(&self, found: &Service, desired: Service) -> Option<Service> {
        let mut merged = found.clone();
        let desired_spec = desired.spec.unwrap_or_default();
        let spec = merged.spec.get_or_insert_with(ServiceSpec::default);
        spec.type_ = desired_spec.type_;
        spec.ports = desired_spec.ports;
        spec.selector = desired_spec.selector;
        Some(merged)
    }
}

/// Workload; full spec replacement
pub struct Workload;

impl ManagedResource for Workload {
    type Object = Deployment;

    fn kind(&self) -> ManagedKind {
        ManagedKind::Deployment
    }

    fn desired(&self, directus: &Directus) -> Option<Deployment> {
        Some(desired_deployment(directus))
    }

    fn merge(&self, found: &Deployment, desired: Deployment) -> Option<Deployment> {
        let mut merged = found.clone();
        merged.spec = desired.spec;
        Some(merged)
    }
}

/// Ingress route; full spec and annotation replacement
pub struct IngressRoute;

impl ManagedResource for IngressRoute {
    type Object = Ingress;

    fn kind(&self) -> ManagedKind {
        ManagedKind::Ingress
    }

    fn desired(&self, directus: &Directus) -> Option<Ingress> {
        desired_ingress(directus)
    }

    fn merge(&self, found: &Ingress, desired: Ingress) -> Option<Ingress> {
        let mut merged = found.clone();
        merged.spec = desired.spec;
        merged.metadata.annotations = desired.metadata.annotations;
        Some(merged)
    }
}

/// Autoscaler; full spec replacement
pub struct Autoscaler;

impl ManagedResource for Autoscaler {
    type Object = HorizontalPodAutoscaler;

    fn kind(&self) -> ManagedKind {
        ManagedKind::HorizontalPodAutoscaler
    }

    fn desired(&self, directus: &Directus) -> Option<HorizontalPodAutoscaler> {
        desired_autoscaler(directus)
    }

    fn merge(
        &self,
        found: &HorizontalPodAutoscaler,
        desired: HorizontalPodAutoscaler,
    ) -> Option<HorizontalPodAutoscaler> {
        let mut merged = found.clone();
        merged.spec = desired.spec;
        Some(merged)
    }
}

/// The convergence table in execution order
///
/// Later entries reference names created by earlier ones (the workload
/// mounts the configuration and secret), so the order is fixed.
pub fn default_steps(credentials: Arc<dyn CredentialGenerator>) -> Vec<Box<dyn ConvergeStep>> {
    vec![
        Box::new(AccessIdentity),
        Box::new(ApplicationSecret::new(credentials)),
        Box::new(Configuration),
        Box::new(Exposure),
        Box::new(Workload),
        Box::new(IngressRoute),
        Box::new(Autoscaler),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::ServicePort;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use k8s_openapi::ByteString;

    use super::*;
    use crate::crd::{DirectusSpec, IngressHost, IngressSpec, ServiceAccountSpec};
    use crate::ownership::{is_owned_by, owner_reference};
    use crate::resources::fixtures::directus;
    use crate::resources::{Credentials, LABEL_INSTANCE};
    use crate::store::{InMemoryStore, MockObjectStore, StoreOp};

    struct FixedCredentials;

    impl CredentialGenerator for FixedCredentials {
        fn generate(&self) -> Credentials {
            Credentials {
                admin_password: "admin-pw".to_string(),
                key: "key-value".to_string(),
                secret: "secret-value".to_string(),
            }
        }
    }

    fn steps() -> Vec<Box<dyn ConvergeStep>> {
        default_steps(Arc::new(FixedCredentials))
    }

    async fn converge_all(store: &InMemoryStore, d: &Directus) -> Vec<Convergence> {
        let owner = owner_reference(d).unwrap();
        let mut outcomes = Vec::new();
        for step in steps() {
            outcomes.push(step.converge(store, d, &owner).await.unwrap());
        }
        outcomes
    }

    #[test]
    fn table_follows_fixed_order() {
        let kinds: Vec<_> = steps().iter().map(|s| s.managed_kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ManagedKind::ServiceAccount,
                ManagedKind::Secret,
                ManagedKind::ConfigMap,
                ManagedKind::Service,
                ManagedKind::Deployment,
                ManagedKind::Ingress,
                ManagedKind::HorizontalPodAutoscaler,
            ]
        );
    }

    // =========================================================================
    // Convergence Stories
    // =========================================================================

    /// Story: the first pass creates every enabled kind, the second changes nothing
    #[tokio::test]
    async fn story_second_pass_is_a_no_op() {
        let store = InMemoryStore::new();
        let d = directus(
            "blog",
            DirectusSpec {
                create_application_secret: true,
                service_account: ServiceAccountSpec {
                    create: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        let first = converge_all(&store, &d).await;
        assert_eq!(
            first,
            vec![
                Convergence::Created,
                Convergence::Created,
                Convergence::Created,
                Convergence::Created,
                Convergence::Created,
                Convergence::Skipped,
                Convergence::Skipped,
            ]
        );

        store.clear_writes();
        let second = converge_all(&store, &d).await;
        assert!(second
            .iter()
            .all(|c| matches!(c, Convergence::Unchanged | Convergence::Skipped)));
        assert!(store.writes().is_empty());
    }

    /// Story: an existing secret is never rewritten
    #[tokio::test]
    async fn story_existing_secret_is_left_alone() {
        let store = InMemoryStore::new();
        let d = directus(
            "blog",
            DirectusSpec {
                create_application_secret: true,
                ..Default::default()
            },
        );
        let owner = owner_reference(&d).unwrap();

        let mut rotated = desired_secret(&d, &FixedCredentials.generate()).unwrap();
        rotated.data = Some(BTreeMap::from([(
            "ADMIN_PASSWORD".to_string(),
            ByteString(b"rotated".to_vec()),
        )]));
        store.seed(ManagedKind::Secret, "cms", to_dynamic(&rotated).unwrap());

        let step = ApplicationSecret::new(Arc::new(FixedCredentials));
        let outcome = step.converge(&store, &d, &owner).await.unwrap();

        assert_eq!(outcome, Convergence::Unchanged);
        assert_eq!(store.write_count(StoreOp::Replace, ManagedKind::Secret), 0);
        let stored: Secret = from_dynamic(
            store
                .object(ManagedKind::Secret, "cms", "blog-application-secret")
                .unwrap(),
        )
        .unwrap();
        assert_eq!(stored.data, rotated.data);
    }

    /// Story: the exposure merge keeps the allocated clusterIP
    #[tokio::test]
    async fn story_exposure_update_preserves_identity_fields() {
        let store = InMemoryStore::new();
        let d = directus("blog", DirectusSpec::default());
        let owner = owner_reference(&d).unwrap();

        Exposure.converge(&store, &d, &owner).await.unwrap();
        let created: Service =
            from_dynamic(store.object(ManagedKind::Service, "cms", "blog").unwrap()).unwrap();
        let cluster_ip = created.spec.as_ref().unwrap().cluster_ip.clone();
        assert!(cluster_ip.is_some());

        let mut changed = d.clone();
        changed.spec.service.port = 8080;
        let outcome = Exposure.converge(&store, &changed, &owner).await.unwrap();
        assert_eq!(outcome, Convergence::Updated);

        let updated: Service =
            from_dynamic(store.object(ManagedKind::Service, "cms", "blog").unwrap()).unwrap();
        let spec = updated.spec.unwrap();
        assert_eq!(spec.cluster_ip, cluster_ip);
        assert_eq!(
            spec.ports.unwrap(),
            vec![ServicePort {
                name: Some("http".to_string()),
                port: 8080,
                target_port: Some(IntOrString::Int(8055)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]
        );
    }

    /// Story: objects created before ownership linkage gain the edge and labels
    #[tokio::test]
    async fn story_unowned_object_is_adopted() {
        let store = InMemoryStore::new();
        let d = directus("blog", DirectusSpec::default());
        let owner = owner_reference(&d).unwrap();

        let mut legacy = desired_config_map(&d);
        legacy.metadata.labels = Some(BTreeMap::from([("team".to_string(), "web".to_string())]));
        store.seed(ManagedKind::ConfigMap, "cms", to_dynamic(&legacy).unwrap());

        let outcome = Configuration.converge(&store, &d, &owner).await.unwrap();
        assert_eq!(outcome, Convergence::Updated);

        let stored: ConfigMap = from_dynamic(
            store
                .object(ManagedKind::ConfigMap, "cms", "blog-configmap")
                .unwrap(),
        )
        .unwrap();
        assert!(is_owned_by(&stored.metadata, &owner));
        let labels = stored.metadata.labels.unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("web"));
        assert_eq!(labels.get(LABEL_INSTANCE).map(String::as_str), Some("blog"));
    }

    /// Story: an ingress enabled without hosts is never touched
    #[tokio::test]
    async fn story_hostless_ingress_is_skipped() {
        let store = MockObjectStore::new();
        let d = directus(
            "blog",
            DirectusSpec {
                ingress: IngressSpec {
                    enabled: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let owner = owner_reference(&d).unwrap();

        // No expectations: any store call panics
        let outcome = IngressRoute.converge(&store, &d, &owner).await.unwrap();
        assert_eq!(outcome, Convergence::Skipped);
    }

    #[tokio::test]
    async fn ingress_annotations_are_replaced_on_update() {
        let store = InMemoryStore::new();
        let mut d = directus(
            "blog",
            DirectusSpec {
                ingress: IngressSpec {
                    enabled: true,
                    annotations: BTreeMap::from([("a".to_string(), "1".to_string())]),
                    hosts: vec![IngressHost {
                        host: "blog.example.com".to_string(),
                        paths: vec![],
                    }],
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let owner = owner_reference(&d).unwrap();
        IngressRoute.converge(&store, &d, &owner).await.unwrap();

        d.spec.ingress.annotations = BTreeMap::from([("b".to_string(), "2".to_string())]);
        let outcome = IngressRoute.converge(&store, &d, &owner).await.unwrap();
        assert_eq!(outcome, Convergence::Updated);

        let stored: Ingress =
            from_dynamic(store.object(ManagedKind::Ingress, "cms", "blog").unwrap()).unwrap();
        assert_eq!(
            stored.metadata.annotations,
            Some(BTreeMap::from([("b".to_string(), "2".to_string())]))
        );
    }

    /// Story: a fetch failure propagates without a create attempt
    #[tokio::test]
    async fn story_fetch_error_aborts_without_create() {
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|_, _, _| {
            Err(Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "connection refused".to_string(),
                reason: "InternalError".to_string(),
                code: 500,
            })))
        });
        store.expect_create().never();

        let d = directus("blog", DirectusSpec::default());
        let owner = owner_reference(&d).unwrap();
        let err = Workload.converge(&store, &d, &owner).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    /// Story: a rejected update surfaces as the step's error
    #[tokio::test]
    async fn story_immutable_field_conflict_surfaces() {
        let store = InMemoryStore::new();
        let d = directus("blog", DirectusSpec::default());
        let owner = owner_reference(&d).unwrap();

        let mut foreign = desired_deployment(&d);
        if let Some(spec) = foreign.spec.as_mut() {
            spec.selector.match_labels =
                Some(BTreeMap::from([("app".to_string(), "legacy".to_string())]));
        }
        store.seed(ManagedKind::Deployment, "cms", to_dynamic(&foreign).unwrap());

        let err = Workload.converge(&store, &d, &owner).await.unwrap_err();
        assert!(err.to_string().contains("field is immutable"));
    }
}
