//! Custom Resource Definitions for the Directus operator
//!
//! This module contains the Directus CRD and the value types it is built from.

mod directus;
mod types;

pub use directus::{Directus, DirectusSpec, DirectusStatus};
pub use types::{
    AutoscalingSpec, Condition, ConditionStatus, DatabaseSpec, DirectusPhase, ImageSpec,
    IngressHost, IngressPath, IngressSpec, RedisSpec, ServiceAccountSpec, ServiceSpec,
};
