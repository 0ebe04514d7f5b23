//! Workload (Deployment) synthesis

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::container::directus_container;
use super::{
    non_empty, non_empty_vec, object_meta, pod_service_account_name, selector_labels,
    standard_labels, workload_name,
};
use crate::crd::Directus;

/// Desired Deployment
///
/// Containers are the Directus container followed by any declared sidecars.
pub fn desired_deployment(directus: &Directus) -> Deployment {
    let spec = &directus.spec;

    let mut containers = vec![directus_container(directus)];
    containers.extend(spec.sidecars.iter().cloned());

    let pod_spec = PodSpec {
        service_account_name: pod_service_account_name(directus),
        security_context: spec.pod_security_context.clone(),
        image_pull_secrets: non_empty_vec(&spec.image_pull_secrets),
        init_containers: non_empty_vec(&spec.init_containers),
        containers,
        volumes: non_empty_vec(&spec.extra_volumes),
        node_selector: non_empty(&spec.node_selector),
        tolerations: non_empty_vec(&spec.tolerations),
        affinity: spec.affinity.clone(),
        ..Default::default()
    };

    Deployment {
        metadata: object_meta(directus, workload_name(directus)),
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replica_count),
            selector: LabelSelector {
                match_labels: Some(selector_labels(directus)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(standard_labels(directus)),
                    annotations: non_empty(&spec.pod_annotations),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
