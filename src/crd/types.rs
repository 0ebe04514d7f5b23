//! Shared types for the Directus CRD
//!
//! Every descriptor here is a plain value type. Fields use their zero value
//! (empty string, `0`, `false`) to mean "unset", which is what the defaulting
//! stage keys off.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::networking::v1::IngressTLS;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Container image reference
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Image repository (e.g. `directus/directus`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,

    /// Image tag
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,

    /// Image pull policy (Always, IfNotPresent, Never)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
}

impl ImageSpec {
    /// Full image reference in `repository:tag` form
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Database connection descriptor
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Database engine (e.g. `postgresql`, `mysql`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub engine: String,

    /// Database hostname
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    /// Database port
    #[serde(default)]
    pub port: i32,

    /// Database name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database: String,

    /// Database username
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    /// Existing secret holding the database password under key `password`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub existing_secret: String,
}

/// Cache/queue (Redis) connection descriptor
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedisSpec {
    /// Whether Directus should use Redis
    #[serde(default)]
    pub enabled: bool,

    /// Redis hostname
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    /// Redis port
    #[serde(default)]
    pub port: i32,

    /// Existing secret holding the Redis password under key `password`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub existing_secret: String,
}

/// Network exposure descriptor
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Service type (ClusterIP, NodePort, LoadBalancer)
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,

    /// Externally reachable service port
    #[serde(default)]
    pub port: i32,
}

/// Ingress route descriptor
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Whether an ingress should be created
    #[serde(default)]
    pub enabled: bool,

    /// Whether the public URL uses https
    #[serde(rename = "enableTLS", default)]
    pub enable_tls: bool,

    /// Ingress class name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class_name: String,

    /// Annotations copied onto the ingress object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Routed hosts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<IngressHost>,

    /// TLS configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<IngressTLS>,
}

impl IngressSpec {
    /// Returns true if an ingress route object should exist
    pub fn is_active(&self) -> bool {
        self.enabled && !self.hosts.is_empty()
    }
}

/// A single routed host
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressHost {
    /// Hostname
    #[serde(default)]
    pub host: String,

    /// Paths routed for this host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<IngressPath>,
}

/// A single routed path
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressPath {
    /// URL path
    #[serde(default)]
    pub path: String,

    /// Path match type (Prefix, Exact, ImplementationSpecific)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_type: String,
}

/// Autoscaling policy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingSpec {
    /// Whether a HorizontalPodAutoscaler should be created
    #[serde(default)]
    pub enabled: bool,

    /// Lower replica bound
    #[serde(default)]
    pub min_replicas: i32,

    /// Upper replica bound
    #[serde(default)]
    pub max_replicas: i32,

    /// Target average CPU utilization; `0` disables the CPU metric
    #[serde(rename = "targetCPUUtilizationPercentage", default)]
    pub target_cpu_utilization_percentage: i32,

    /// Target average memory utilization; `0` disables the memory metric
    #[serde(rename = "targetMemoryUtilizationPercentage", default)]
    pub target_memory_utilization_percentage: i32,
}

/// Access-identity (ServiceAccount) descriptor
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSpec {
    /// Whether the operator should create the service account
    #[serde(default)]
    pub create: bool,

    /// Annotations to set on the service account
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Explicit service account name; derived from the resource name when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// Directus lifecycle phase
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum DirectusPhase {
    /// Workload exists but not all replicas are ready
    #[default]
    Pending,
    /// All desired replicas are ready
    Running,
    /// Workload state could not be observed
    Failed,
}

impl std::fmt::Display for DirectusPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Keep the previous transition time when the status did not change
    pub fn carry_transition_time(mut self, previous: Option<&Condition>) -> Self {
        if let Some(prev) = previous {
            if prev.type_ == self.type_ && prev.status == self.status {
                self.last_transition_time = prev.last_transition_time;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_reference_joins_repository_and_tag() {
        let image = ImageSpec {
            repository: "directus/directus".to_string(),
            tag: "11.1.0".to_string(),
            pull_policy: None,
        };
        assert_eq!(image.reference(), "directus/directus:11.1.0");
    }

    #[test]
    fn ingress_is_active_only_with_hosts() {
        let mut ingress = IngressSpec {
            enabled: true,
            ..Default::default()
        };
        assert!(!ingress.is_active());

        ingress.hosts.push(IngressHost {
            host: "cms.example.com".to_string(),
            paths: vec![],
        });
        assert!(ingress.is_active());

        ingress.enabled = false;
        assert!(!ingress.is_active());
    }

    #[test]
    fn phase_display_matches_serialized_form() {
        for phase in [
            DirectusPhase::Pending,
            DirectusPhase::Running,
            DirectusPhase::Failed,
        ] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase));
        }
    }

    /// Story: a condition that keeps its status keeps its transition time
    #[test]
    fn story_transition_time_survives_unchanged_status() {
        let earlier = Condition {
            last_transition_time: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            ..Condition::new("Ready", ConditionStatus::True, "Ready", "Directus is running")
        };

        let same = Condition::new("Ready", ConditionStatus::True, "Ready", "Directus is running")
            .carry_transition_time(Some(&earlier));
        assert_eq!(same.last_transition_time, earlier.last_transition_time);

        let flipped = Condition::new(
            "Ready",
            ConditionStatus::Unknown,
            "Reconciling",
            "Reconciling Directus resources",
        )
        .carry_transition_time(Some(&earlier));
        assert_ne!(flipped.last_transition_time, earlier.last_transition_time);
    }

    #[test]
    fn autoscaling_uses_upper_case_metric_keys() {
        let json = serde_json::json!({
            "enabled": true,
            "minReplicas": 2,
            "maxReplicas": 5,
            "targetCPUUtilizationPercentage": 80
        });
        let spec: AutoscalingSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.target_cpu_utilization_percentage, 80);
        assert_eq!(spec.target_memory_utilization_percentage, 0);
    }
}
