//! Directus Custom Resource Definition
//!
//! The Directus CRD is the primary resource: the user's declarative intent for
//! one Directus deployment. Its status is owned exclusively by the status
//! aggregator in [`crate::controller`].

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvVar, LocalObjectReference, PodSecurityContext, ResourceRequirements,
    SecurityContext, Toleration, Volume, VolumeMount,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    AutoscalingSpec, Condition, DatabaseSpec, DirectusPhase, ImageSpec, IngressSpec, RedisSpec,
    ServiceAccountSpec, ServiceSpec,
};
use crate::{
    DEFAULT_ADMIN_EMAIL, DEFAULT_IMAGE_REPOSITORY, DEFAULT_IMAGE_TAG, DEFAULT_REPLICA_COUNT,
    DEFAULT_SERVICE_PORT, DEFAULT_SERVICE_TYPE,
};

/// Specification for a Directus deployment
///
/// Every field is optional; unset fields are filled by [`DirectusSpec::with_defaults`]
/// at the start of each reconciliation pass.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "directus.example.com",
    version = "v1",
    kind = "Directus",
    plural = "directuses",
    namespaced,
    status = "DirectusStatus",
    scale = r#"{"specReplicasPath":".spec.replicaCount","statusReplicasPath":".status.replicas","labelSelectorPath":".status.selector"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DirectusSpec {
    /// Number of Directus replicas
    #[serde(default)]
    pub replica_count: i32,

    /// Container image
    #[serde(default)]
    pub image: ImageSpec,

    /// Image pull secrets for the pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Admin contact address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub admin_email: String,

    /// Service account configuration
    #[serde(default)]
    pub service_account: ServiceAccountSpec,

    /// Annotations added to the pod template
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_annotations: BTreeMap<String, String>,

    /// Pod-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,

    /// Container-level security context for the Directus container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,

    /// Network exposure
    #[serde(default)]
    pub service: ServiceSpec,

    /// Ingress route
    #[serde(default)]
    pub ingress: IngressSpec,

    /// Extra environment entries for the Directus container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_env_vars: Vec<EnvVar>,

    /// Existing secrets exposed to the container as environment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attach_existing_secrets: Vec<String>,

    /// Resource requirements for the Directus container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Autoscaling policy
    #[serde(default)]
    pub autoscaling: AutoscalingSpec,

    /// Enable the liveness probe
    #[serde(default)]
    pub enable_liveness_probe: bool,

    /// Enable the readiness probe
    #[serde(default)]
    pub enable_readiness_probe: bool,

    /// Enable the startup probe
    #[serde(default)]
    pub enable_startup_probe: bool,

    /// Node selection constraints
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Pod tolerations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Pod affinity rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Extra pod volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_volumes: Vec<Volume>,

    /// Extra volume mounts for the Directus container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_volume_mounts: Vec<VolumeMount>,

    /// Whether the operator generates the application secret
    #[serde(default)]
    pub create_application_secret: bool,

    /// Explicit application secret name; derived from the resource name when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub application_secret_name: String,

    /// Database connection
    #[serde(default)]
    pub database: DatabaseSpec,

    /// Redis connection
    #[serde(default)]
    pub redis: RedisSpec,

    /// Init containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<Container>,

    /// Sidecar containers appended after the Directus container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sidecars: Vec<Container>,
}

impl DirectusSpec {
    /// Fill unset fields with the operator defaults
    ///
    /// Total and idempotent: applying it twice yields the same spec as once.
    pub fn with_defaults(mut self) -> Self {
        if self.replica_count == 0 {
            self.replica_count = DEFAULT_REPLICA_COUNT;
        }
        if self.image.repository.is_empty() {
            self.image.repository = DEFAULT_IMAGE_REPOSITORY.to_string();
        }
        if self.image.tag.is_empty() {
            self.image.tag = DEFAULT_IMAGE_TAG.to_string();
        }
        if self.service.port == 0 {
            self.service.port = DEFAULT_SERVICE_PORT;
        }
        if self.service.type_.is_empty() {
            self.service.type_ = DEFAULT_SERVICE_TYPE.to_string();
        }
        if self.admin_email.is_empty() {
            self.admin_email = DEFAULT_ADMIN_EMAIL.to_string();
        }
        self
    }
}

/// Status for a Directus resource
///
/// Recomputed from scratch on every reconciliation pass.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectusStatus {
    /// Aggregate phase
    #[serde(default)]
    pub phase: DirectusPhase,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions representing the deployment state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Observed ready replicas of the workload
    #[serde(default)]
    pub ready_replicas: i32,

    /// Observed replicas of the workload
    #[serde(default)]
    pub replicas: i32,

    /// Label selector for the scale subresource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Database readiness (not a verified health signal)
    #[serde(default)]
    pub database_ready: bool,

    /// Redis readiness, mirrors `spec.redis.enabled`
    #[serde(default)]
    pub redis_ready: bool,

    /// Ingress readiness, mirrors `spec.ingress.enabled`
    #[serde(default)]
    pub ingress_ready: bool,
}

impl DirectusStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: DirectusPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Add a condition and return self for chaining
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }

    /// Look up a condition by type
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
