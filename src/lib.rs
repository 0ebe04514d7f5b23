//! Directus operator - reconciles Directus deployments from a Directus CRD
//!
//! A `Directus` resource declares the desired application; the operator
//! converges the objects it needs (access identity, credentials secret,
//! configuration, service, workload, and optionally an ingress route and an
//! autoscaler) and reports the workload's readiness back on the resource's
//! status.
//!
//! # Architecture
//!
//! Every pass runs the same chain for one resource:
//! defaulting, then synthesis of each desired object, then convergence of
//! each object against the store in a fixed order, then status aggregation.
//! Synthesis is pure; only convergence and status persistence perform I/O,
//! and they do so through an injected [`store::ObjectStore`].
//!
//! # Modules
//!
//! - [`crd`] - The Directus custom resource and defaulting
//! - [`resources`] - Desired-object synthesis per managed kind
//! - [`ownership`] - Owner references for cascading deletion
//! - [`store`] - Object store abstraction (kube-backed and in-memory)
//! - [`controller`] - Convergence table, status aggregation, reconcile entry point
//! - [`config`] - Controller settings
//! - [`telemetry`] - Logging initialization
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod ownership;
pub mod resources;
pub mod store;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// Applied by `DirectusSpec::with_defaults` when the field holds its zero value.

/// Default number of Directus replicas
pub const DEFAULT_REPLICA_COUNT: i32 = 1;

/// Default Directus image repository
pub const DEFAULT_IMAGE_REPOSITORY: &str = "directus/directus";

/// Default Directus image tag
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Default externally exposed service port
pub const DEFAULT_SERVICE_PORT: i32 = 80;

/// Default service type
pub const DEFAULT_SERVICE_TYPE: &str = "ClusterIP";

/// Default admin contact address
pub const DEFAULT_ADMIN_EMAIL: &str = "directus-admin@example.com";

// =============================================================================
// Fixed Interface Constants
// =============================================================================

/// Port the Directus container listens on
pub const DIRECTUS_CONTAINER_PORT: i32 = 8055;

/// Name of the container and service port
pub const HTTP_PORT_NAME: &str = "http";

/// Application name used in labels and as the container name
pub const APP_NAME: &str = "directus";

/// Value of the managed-by label
pub const MANAGED_BY: &str = "directus-operator";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "directus-operator";
