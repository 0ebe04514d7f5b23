//! Primary container assembly
//!
//! The Directus container is composed in a fixed order: the base container
//! (image, port, configuration env), then attached secrets, the database and
//! Redis passwords, the generated application secret, and finally the probes
//! that were explicitly enabled.

use k8s_openapi::api::core::v1::{
    ConfigMapEnvSource, Container, ContainerPort, EnvFromSource, EnvVar, EnvVarSource,
    HTTPGetAction, Probe, SecretEnvSource, SecretKeySelector,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{application_secret_name, config_map_name, non_empty_vec};
use crate::crd::Directus;
use crate::{APP_NAME, DIRECTUS_CONTAINER_PORT, HTTP_PORT_NAME};

/// Path probed by every health check
pub const HEALTH_PATH: &str = "/";

/// Key read from existing password secrets
pub const PASSWORD_SECRET_KEY: &str = "password";

/// Timing parameters for one probe kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeTiming {
    /// Seconds before the first probe
    pub initial_delay_seconds: i32,
    /// Seconds between probes
    pub period_seconds: i32,
    /// Seconds before a probe times out
    pub timeout_seconds: i32,
    /// Consecutive failures tolerated
    pub failure_threshold: i32,
}

impl ProbeTiming {
    fn probe(self) -> Probe {
        Probe {
            http_get: Some(HTTPGetAction {
                path: Some(HEALTH_PATH.to_string()),
                port: IntOrString::String(HTTP_PORT_NAME.to_string()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(self.initial_delay_seconds),
            period_seconds: Some(self.period_seconds),
            timeout_seconds: Some(self.timeout_seconds),
            failure_threshold: Some(self.failure_threshold),
            ..Default::default()
        }
    }
}

/// Liveness probe timing
pub const LIVENESS: ProbeTiming = ProbeTiming {
    initial_delay_seconds: 60,
    period_seconds: 10,
    timeout_seconds: 5,
    failure_threshold: 5,
};

/// Readiness probe timing
pub const READINESS: ProbeTiming = ProbeTiming {
    initial_delay_seconds: 30,
    period_seconds: 5,
    timeout_seconds: 3,
    failure_threshold: 3,
};

/// Startup probe timing (up to ~5 minutes)
pub const STARTUP: ProbeTiming = ProbeTiming {
    initial_delay_seconds: 10,
    period_seconds: 10,
    timeout_seconds: 3,
    failure_threshold: 30,
};

fn secret_env_from(name: &str) -> EnvFromSource {
    EnvFromSource {
        secret_ref: Some(SecretEnvSource {
            name: name.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn password_env(var: &str, secret: &str) -> EnvVar {
    EnvVar {
        name: var.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: PASSWORD_SECRET_KEY.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the Directus container
pub fn directus_container(directus: &Directus) -> Container {
    let spec = &directus.spec;

    let mut env_from = vec![EnvFromSource {
        config_map_ref: Some(ConfigMapEnvSource {
            name: config_map_name(directus),
            ..Default::default()
        }),
        ..Default::default()
    }];
    env_from.extend(spec.attach_existing_secrets.iter().map(|s| secret_env_from(s)));

    let mut env = spec.extra_env_vars.clone();
    if !spec.database.existing_secret.is_empty() {
        env.push(password_env("DB_PASSWORD", &spec.database.existing_secret));
    }
    if spec.redis.enabled && !spec.redis.existing_secret.is_empty() {
        env.push(password_env("REDIS_PASSWORD", &spec.redis.existing_secret));
    }

    if spec.create_application_secret {
        env_from.push(secret_env_from(&application_secret_name(directus)));
    }

    Container {
        name: APP_NAME.to_string(),
        image: Some(spec.image.reference()),
        image_pull_policy: spec.image.pull_policy.clone(),
        ports: Some(vec![ContainerPort {
            name: Some(HTTP_PORT_NAME.to_string()),
            container_port: DIRECTUS_CONTAINER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env_from: Some(env_from),
        env: non_empty_vec(&env),
        resources: spec.resources.clone(),
        volume_mounts: non_empty_vec(&spec.extra_volume_mounts),
        security_context: spec.security_context.clone(),
        liveness_probe: spec.enable_liveness_probe.then(|| LIVENESS.probe()),
        readiness_probe: spec.enable_readiness_probe.then(|| READINESS.probe()),
        startup_probe: spec.enable_startup_probe.then(|| STARTUP.probe()),
        ..Default::default()
    }
}
