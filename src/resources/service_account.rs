//! Access identity (ServiceAccount) synthesis

use k8s_openapi::api::core::v1::ServiceAccount;

use super::{non_empty, object_meta, service_account_name};
use crate::crd::Directus;

/// Desired ServiceAccount, or `None` when creation was not requested
pub fn desired_service_account(directus: &Directus) -> Option<ServiceAccount> {
    let spec = &directus.spec.service_account;
    if !spec.create {
        return None;
    }

    let mut metadata = object_meta(directus, service_account_name(directus));
    metadata.annotations = non_empty(&spec.annotations);

    Some(ServiceAccount {
        metadata,
        ..Default::default()
    })
}
