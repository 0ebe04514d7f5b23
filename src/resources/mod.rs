//! Desired-object synthesis for Directus managed resources
//!
//! One pure function per managed kind maps a (defaulted) [`Directus`] to the
//! object the store should converge to. Nothing here performs I/O.
//!
//! - [`service_account`] - access identity, only when creation is requested
//! - [`secret`] - generated application credentials
//! - [`config_map`] - non-secret environment for the Directus container
//! - [`service`] - network exposure
//! - [`deployment`] - the workload, with the container built by [`container`]
//! - [`ingress`] - host/path routing, only when enabled with hosts
//! - [`autoscaler`] - HorizontalPodAutoscaler, only when enabled

pub mod autoscaler;
pub mod config_map;
pub mod container;
pub mod deployment;
pub mod ingress;
pub mod secret;
pub mod service;
pub mod service_account;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::Directus;
use crate::{APP_NAME, MANAGED_BY};

pub use autoscaler::desired_autoscaler;
pub use config_map::desired_config_map;
pub use deployment::desired_deployment;
pub use ingress::desired_ingress;
pub use secret::{desired_secret, CredentialGenerator, Credentials, RandomCredentials};
pub use service::desired_service;
pub use service_account::desired_service_account;

/// Label key for the application name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
/// Label key for the owning Directus instance
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
/// Label key for the application version (image tag)
pub const LABEL_VERSION: &str = "app.kubernetes.io/version";
/// Label key for the component
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
/// Label key for the managing controller
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// The managed kinds, in convergence order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManagedKind {
    /// core/v1 ServiceAccount
    ServiceAccount,
    /// core/v1 Secret
    Secret,
    /// core/v1 ConfigMap
    ConfigMap,
    /// core/v1 Service
    Service,
    /// apps/v1 Deployment
    Deployment,
    /// networking.k8s.io/v1 Ingress
    Ingress,
    /// autoscaling/v2 HorizontalPodAutoscaler
    HorizontalPodAutoscaler,
}

impl ManagedKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceAccount => "ServiceAccount",
            Self::Secret => "Secret",
            Self::ConfigMap => "ConfigMap",
            Self::Service => "Service",
            Self::Deployment => "Deployment",
            Self::Ingress => "Ingress",
            Self::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
        }
    }
}

impl std::fmt::Display for ManagedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Naming
// =============================================================================

/// Name of the workload, exposure, ingress and autoscaler objects
pub fn workload_name(directus: &Directus) -> String {
    directus.name_any()
}

/// Name of the configuration object
pub fn config_map_name(directus: &Directus) -> String {
    format!("{}-configmap", directus.name_any())
}

/// Name of the access identity the operator manages
pub fn service_account_name(directus: &Directus) -> String {
    let explicit = &directus.spec.service_account.name;
    if explicit.is_empty() {
        format!("{}-sa", directus.name_any())
    } else {
        explicit.clone()
    }
}

/// Service account the pod runs as, if any
///
/// Without creation and without an explicit name there is nothing to point
/// at, so the namespace default is used.
pub fn pod_service_account_name(directus: &Directus) -> Option<String> {
    let sa = &directus.spec.service_account;
    if sa.create || !sa.name.is_empty() {
        Some(service_account_name(directus))
    } else {
        None
    }
}

/// Name of the generated application secret
pub fn application_secret_name(directus: &Directus) -> String {
    let explicit = &directus.spec.application_secret_name;
    if explicit.is_empty() {
        format!("{}-application-secret", directus.name_any())
    } else {
        explicit.clone()
    }
}

// =============================================================================
// Labels
// =============================================================================

/// Full label set applied to every managed object and pod
pub fn standard_labels(directus: &Directus) -> BTreeMap<String, String> {
    let mut labels = selector_labels(directus);
    labels.insert(LABEL_VERSION.to_string(), directus.spec.image.tag.clone());
    labels
}

/// Stable label subset used for pod selection
///
/// Excludes the version label so an image tag change does not touch the
/// immutable Deployment selector.
pub fn selector_labels(directus: &Directus) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), APP_NAME.to_string()),
        (LABEL_INSTANCE.to_string(), directus.name_any()),
        (LABEL_COMPONENT.to_string(), APP_NAME.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
    ])
}

/// Selector labels rendered as a label-selector string
pub fn selector_string(directus: &Directus) -> String {
    selector_labels(directus)
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Metadata for a managed object: name, namespace and the standard labels
pub(crate) fn object_meta(directus: &Directus, name: impl Into<String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: directus.namespace(),
        labels: Some(standard_labels(directus)),
        ..Default::default()
    }
}

/// Returns `None` for an empty map so it is omitted when serialized
pub(crate) fn non_empty<K: Ord + Clone, V: Clone>(
    map: &BTreeMap<K, V>,
) -> Option<BTreeMap<K, V>> {
    if map.is_empty() {
        None
    } else {
        Some(map.clone())
    }
}

/// Returns `None` for an empty slice so it is omitted when serialized
pub(crate) fn non_empty_vec<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items.to_vec())
    }
}
