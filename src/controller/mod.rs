//! Controller for the Directus CRD
//!
//! The reconciliation chain: a fixed convergence table over the managed
//! kinds, followed by status aggregation. Watching, queueing and per-key
//! serialization belong to the kube-runtime `Controller` that drives
//! [`reconcile`] and [`error_policy`].

mod converge;
mod directus;
mod scope;
mod status;

pub use converge::{
    default_steps, AccessIdentity, ApplicationSecret, Autoscaler, Configuration, ConvergeStep,
    Convergence, Exposure, IngressRoute, ManagedResource, Workload,
};
pub use directus::{
    error_policy, reconcile, reconcile_directus, Context, ContextBuilder, PassOutcome,
};
pub use scope::{PassScope, ScopedStore};
pub use status::{aggregate_status, ALL_READY_MESSAGE, READY_CONDITION};
