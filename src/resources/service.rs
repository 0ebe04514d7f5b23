//! Network exposure (Service) synthesis

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{object_meta, selector_labels, workload_name};
use crate::crd::Directus;
use crate::{DIRECTUS_CONTAINER_PORT, HTTP_PORT_NAME};

/// Desired Service: one TCP port forwarding to the container port
pub fn desired_service(directus: &Directus) -> Service {
    let spec = &directus.spec.service;

    Service {
        metadata: object_meta(directus, workload_name(directus)),
        spec: Some(ServiceSpec {
            type_: Some(spec.type_.clone()),
            ports: Some(vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                port: spec.port,
                target_port: Some(IntOrString::Int(DIRECTUS_CONTAINER_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            selector: Some(selector_labels(directus)),
            ..Default::default()
        }),
        ..Default::default()
    }
}
