//! Application secret synthesis
//!
//! The secret is written once, on creation, and never updated afterwards.
//! Credential material comes from a [`CredentialGenerator`] so the synthesis
//! itself stays free of randomness and can be pinned in tests.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::{application_secret_name, object_meta};
use crate::crd::Directus;

/// Secret key holding the initial admin password
pub const ADMIN_PASSWORD_KEY: &str = "ADMIN_PASSWORD";
/// Secret key holding the Directus project key
pub const KEY_KEY: &str = "KEY";
/// Secret key holding the Directus signing secret
pub const SECRET_KEY: &str = "SECRET";

/// Length of generated credential values
pub const CREDENTIAL_LENGTH: usize = 32;

/// Credential values placed in the application secret
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// Initial admin password
    pub admin_password: String,
    /// Directus `KEY`
    pub key: String,
    /// Directus `SECRET`
    pub secret: String,
}

/// Source of credential material for new application secrets
pub trait CredentialGenerator: Send + Sync {
    /// Produce a fresh set of credentials
    fn generate(&self) -> Credentials;
}

/// Generates alphanumeric credentials from the thread-local CSPRNG
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCredentials;

impl RandomCredentials {
    fn token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CREDENTIAL_LENGTH)
            .map(char::from)
            .collect()
    }
}

impl CredentialGenerator for RandomCredentials {
    fn generate(&self) -> Credentials {
        Credentials {
            admin_password: Self::token(),
            key: Self::token(),
            secret: Self::token(),
        }
    }
}

/// Desired application Secret, or `None` when generation was not requested
pub fn desired_secret(directus: &Directus, credentials: &Credentials) -> Option<Secret> {
    if !directus.spec.create_application_secret {
        return None;
    }

    let data = BTreeMap::from([
        (
            ADMIN_PASSWORD_KEY.to_string(),
            ByteString(credentials.admin_password.clone().into_bytes()),
        ),
        (
            KEY_KEY.to_string(),
            ByteString(credentials.key.clone().into_bytes()),
        ),
        (
            SECRET_KEY.to_string(),
            ByteString(credentials.secret.clone().into_bytes()),
        ),
    ]);

    Some(Secret {
        metadata: object_meta(directus, application_secret_name(directus)),
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    })
}
