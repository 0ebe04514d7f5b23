//! Autoscaler (HorizontalPodAutoscaler) synthesis

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec,
    MetricTarget, ResourceMetricSource,
};

use super::{object_meta, workload_name};
use crate::crd::{AutoscalingSpec, Directus};

fn utilization_metric(resource: &str, target: i32) -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: resource.to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(target),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

/// Metric list: CPU iff its target is positive, then memory iff its target is positive
pub fn metrics(spec: &AutoscalingSpec) -> Vec<MetricSpec> {
    let mut metrics = Vec::with_capacity(2);
    if spec.target_cpu_utilization_percentage > 0 {
        metrics.push(utilization_metric(
            "cpu",
            spec.target_cpu_utilization_percentage,
        ));
    }
    if spec.target_memory_utilization_percentage > 0 {
        metrics.push(utilization_metric(
            "memory",
            spec.target_memory_utilization_percentage,
        ));
    }
    metrics
}

/// Desired HorizontalPodAutoscaler, or `None` unless autoscaling is enabled
pub fn desired_autoscaler(directus: &Directus) -> Option<HorizontalPodAutoscaler> {
    let spec = &directus.spec.autoscaling;
    if !spec.enabled {
        return None;
    }

    Some(HorizontalPodAutoscaler {
        metadata: object_meta(directus, workload_name(directus)),
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: workload_name(directus),
            },
            min_replicas: Some(spec.min_replicas),
            max_replicas: spec.max_replicas,
            metrics: Some(metrics(spec)),
            ..Default::default()
        }),
        ..Default::default()
    })
}
