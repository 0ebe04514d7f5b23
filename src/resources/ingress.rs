//! Ingress route synthesis

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};

use super::{non_empty, non_empty_vec, object_meta, workload_name};
use crate::crd::{Directus, IngressPath};

/// Path type used when none (or an unknown one) is declared
pub const DEFAULT_PATH_TYPE: &str = "Prefix";

const PATH_TYPES: [&str; 3] = ["Prefix", "Exact", "ImplementationSpecific"];

fn path_type(path: &IngressPath) -> String {
    if PATH_TYPES.contains(&path.path_type.as_str()) {
        path.path_type.clone()
    } else {
        DEFAULT_PATH_TYPE.to_string()
    }
}

/// Desired Ingress, or `None` unless ingress is enabled with at least one host
///
/// One rule per host, one path entry per declared path, each routed to the
/// exposure Service's port.
pub fn desired_ingress(directus: &Directus) -> Option<Ingress> {
    let spec = &directus.spec.ingress;
    if !spec.is_active() {
        return None;
    }

    let service_name = workload_name(directus);
    let service_port = directus.spec.service.port;

    let rules = spec
        .hosts
        .iter()
        .map(|host| IngressRule {
            host: (!host.host.is_empty()).then(|| host.host.clone()),
            http: Some(HTTPIngressRuleValue {
                paths: host
                    .paths
                    .iter()
                    .map(|path| HTTPIngressPath {
                        path: Some(path.path.clone()),
                        path_type: path_type(path),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: service_name.clone(),
                                port: Some(ServiceBackendPort {
                                    number: Some(service_port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    })
                    .collect(),
            }),
        })
        .collect();

    let mut metadata = object_meta(directus, workload_name(directus));
    metadata.annotations = non_empty(&spec.annotations);

    Some(Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: (!spec.class_name.is_empty()).then(|| spec.class_name.clone()),
            tls: non_empty_vec(&spec.tls),
            rules: Some(rules),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::networking::v1::IngressTLS;

    use super::*;
    use crate::crd::{DirectusSpec, IngressHost, IngressSpec as RouteSpec};
    use crate::resources::fixtures::directus;

    fn routed(hosts: Vec<IngressHost>) -> DirectusSpec {
        DirectusSpec {
            ingress: RouteSpec {
                enabled: true,
                hosts,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn host(name: &str, paths: &[&str]) -> IngressHost {
        IngressHost {
            host: name.to_string(),
            paths: paths
                .iter()
                .map(|p| IngressPath {
                    path: p.to_string(),
                    path_type: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn disabled_or_hostless_ingress_builds_nothing() {
        assert!(desired_ingress(&directus("blog", DirectusSpec::default())).is_none());
        assert!(desired_ingress(&directus("blog", routed(vec![]))).is_none());
    }

    #[test]
    fn one_rule_per_host_one_entry_per_path() {
        let d = directus(
            "blog",
            routed(vec![
                host("cms.example.com", &["/", "/admin"]),
                host("assets.example.com", &["/assets"]),
            ]),
        );
        let rules = desired_ingress(&d).unwrap().spec.unwrap().rules.unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].host.as_deref(), Some("cms.example.com"));
        let paths = &rules[0].http.as_ref().unwrap().paths;
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1].path.as_deref(), Some("/admin"));
        assert_eq!(paths[1].path_type, "Prefix");

        let backend = paths[0].backend.service.as_ref().unwrap();
        assert_eq!(backend.name, "blog");
        assert_eq!(backend.port.as_ref().unwrap().number, Some(80));

        assert_eq!(rules[1].http.as_ref().unwrap().paths.len(), 1);
    }

    #[test]
    fn declared_path_type_is_honoured_when_valid() {
        let mut spec = routed(vec![host("cms.example.com", &["/exact", "/bogus"])]);
        spec.ingress.hosts[0].paths[0].path_type = "Exact".to_string();
        spec.ingress.hosts[0].paths[1].path_type = "Regex".to_string();

        let rules = desired_ingress(&directus("blog", spec))
            .unwrap()
            .spec
            .unwrap()
            .rules
            .unwrap();
        let paths = &rules[0].http.as_ref().unwrap().paths;
        assert_eq!(paths[0].path_type, "Exact");
        assert_eq!(paths[1].path_type, "Prefix");
    }

    #[test]
    fn class_annotations_and_tls_are_copied() {
        let mut spec = routed(vec![host("cms.example.com", &["/"])]);
        spec.ingress.class_name = "nginx".to_string();
        spec.ingress.annotations = BTreeMap::from([(
            "cert-manager.io/cluster-issuer".to_string(),
            "letsencrypt".to_string(),
        )]);
        spec.ingress.tls = vec![IngressTLS {
            hosts: Some(vec!["cms.example.com".to_string()]),
            secret_name: Some("cms-tls".to_string()),
        }];

        let ingress = desired_ingress(&directus("blog", spec)).unwrap();
        assert_eq!(
            ingress.metadata.annotations.unwrap()["cert-manager.io/cluster-issuer"],
            "letsencrypt"
        );
        let spec = ingress.spec.unwrap();
        assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));
        assert_eq!(spec.tls.unwrap()[0].secret_name.as_deref(), Some("cms-tls"));
    }

    #[test]
    fn empty_class_name_is_omitted() {
        let ingress =
            desired_ingress(&directus("blog", routed(vec![host("cms.test", &["/"])]))).unwrap();
        assert_eq!(ingress.spec.unwrap().ingress_class_name, None);
    }
}
