//! Configuration (ConfigMap) synthesis

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;

use super::{config_map_name, object_meta};
use crate::crd::Directus;

/// Build the environment map exposed to the Directus container
///
/// `ADMIN_EMAIL` and `REDIS_ENABLED` are always present; every other key only
/// appears when its source field is set.
pub fn config_data(directus: &Directus) -> BTreeMap<String, String> {
    let spec = &directus.spec;
    let mut data = BTreeMap::new();

    data.insert("ADMIN_EMAIL".to_string(), spec.admin_email.clone());

    let db = &spec.database;
    if !db.engine.is_empty() {
        data.insert("DB_CLIENT".to_string(), db.engine.clone());
    }
    if !db.host.is_empty() {
        data.insert("DB_HOST".to_string(), db.host.clone());
    }
    if db.port > 0 {
        data.insert("DB_PORT".to_string(), db.port.to_string());
    }
    if !db.database.is_empty() {
        data.insert("DB_DATABASE".to_string(), db.database.clone());
    }
    if !db.username.is_empty() {
        data.insert("DB_USER".to_string(), db.username.clone());
    }

    let redis = &spec.redis;
    data.insert("REDIS_ENABLED".to_string(), redis.enabled.to_string());
    if redis.enabled {
        if !redis.host.is_empty() {
            data.insert("REDIS_HOST".to_string(), redis.host.clone());
        }
        if redis.port > 0 {
            data.insert("REDIS_PORT".to_string(), redis.port.to_string());
        }
    }

    if let Some(url) = public_url(directus) {
        data.insert("PUBLIC_URL".to_string(), url);
    }

    data
}

/// Public URL derived from the first ingress host
fn public_url(directus: &Directus) -> Option<String> {
    let ingress = &directus.spec.ingress;
    if !ingress.is_active() {
        return None;
    }
    let host = ingress.hosts.iter().map(|h| h.host.as_str()).find(|h| !h.is_empty())?;
    let scheme = if ingress.enable_tls { "https" } else { "http" };
    Some(format!("{scheme}://{host}"))
}

/// Desired ConfigMap
pub fn desired_config_map(directus: &Directus) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(directus, config_map_name(directus)),
        data: Some(config_data(directus)),
        ..Default::default()
    }
}
