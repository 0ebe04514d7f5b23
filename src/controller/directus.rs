//! Directus reconciliation
//!
//! One pass re-reads the Directus, defaults its spec, runs the convergence
//! table in order and then writes the aggregated status. Errors abort the
//! rest of the pass; the controller runtime retries the whole pass later
//! through [`error_policy`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::converge::{default_steps, ConvergeStep, Convergence};
use super::scope::{PassScope, ScopedStore};
use super::status::aggregate_status;
use crate::config::{ControllerConfig, MAX_ERROR_BACKOFF};
use crate::crd::{Directus, DirectusPhase};
use crate::ownership::owner_reference;
use crate::resources::{workload_name, CredentialGenerator, ManagedKind, RandomCredentials};
use crate::store::{from_dynamic, ObjectStore};
use crate::Error;

/// Failure counters untouched for this long belong to a Directus that is no
/// longer retried; a failing one is requeued within [`MAX_ERROR_BACKOFF`]
const STALE_FAILURE_AFTER: Duration = Duration::from_secs(MAX_ERROR_BACKOFF.as_secs() * 2);

#[derive(Clone, Copy, Debug)]
struct FailureRecord {
    count: u32,
    last: Instant,
}

/// Controller context shared by every reconciliation
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(Arc::new(KubeObjectStore::new(client)))
///     .config(config)
///     .shutdown(token)
///     .build();
/// ```
pub struct Context {
    /// Object store every step reads and writes through
    pub store: Arc<dyn ObjectStore>,
    /// Convergence table, run in order
    pub steps: Vec<Box<dyn ConvergeStep>>,
    /// Controller settings
    pub config: ControllerConfig,
    /// Cancelled on shutdown; each pass runs under a child token
    pub shutdown: CancellationToken,
    failures: Mutex<HashMap<String, FailureRecord>>,
}

impl Context {
    /// Create a builder around the given store
    pub fn builder(store: Arc<dyn ObjectStore>) -> ContextBuilder {
        ContextBuilder::new(store)
    }

    /// Scope for a new pass: a child of the shutdown token plus the pass timeout
    pub fn pass_scope(&self) -> PassScope {
        PassScope::new(self.shutdown.child_token(), self.config.reconcile_timeout())
    }

    fn record_failure(&self, key: &str) -> u32 {
        let now = Instant::now();
        let mut failures = self.failures.lock();
        // Deleted Directus resources are never reconciled again
        failures.retain(|k, r| k == key || now.duration_since(r.last) < STALE_FAILURE_AFTER);

        let record = failures.entry(key.to_string()).or_insert(FailureRecord {
            count: 0,
            last: now,
        });
        record.count = record.count.saturating_add(1);
        record.last = now;
        record.count
    }

    #[cfg(test)]
    fn tracked_failures(&self) -> usize {
        self.failures.lock().len()
    }

    fn clear_failures(&self, key: &str) {
        self.failures.lock().remove(key);
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    store: Arc<dyn ObjectStore>,
    config: ControllerConfig,
    credentials: Option<Arc<dyn CredentialGenerator>>,
    steps: Option<Vec<Box<dyn ConvergeStep>>>,
    shutdown: Option<CancellationToken>,
}

impl ContextBuilder {
    fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            config: ControllerConfig::default(),
            credentials: None,
            steps: None,
            shutdown: None,
        }
    }

    /// Set the controller settings
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the credential source for new application secrets
    pub fn credentials(mut self, credentials: Arc<dyn CredentialGenerator>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Replace the convergence table (primarily for testing)
    pub fn steps(mut self, steps: Vec<Box<dyn ConvergeStep>>) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Set the shutdown token passes are scoped under
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(RandomCredentials));
        Context {
            store: self.store,
            steps: self.steps.unwrap_or_else(|| default_steps(credentials)),
            config: self.config,
            shutdown: self.shutdown.unwrap_or_default(),
            failures: Mutex::new(HashMap::new()),
        }
    }
}

/// Result of a completed pass
#[derive(Clone, Debug, PartialEq)]
pub enum PassOutcome {
    /// The Directus no longer exists; nothing was touched
    Gone,
    /// Every step ran and the status was aggregated
    Reconciled {
        /// Phase written to the status
        phase: DirectusPhase,
        /// What each step did, in execution order
        steps: Vec<(ManagedKind, Convergence)>,
        /// Whether the status differed and was written
        status_written: bool,
    },
}

fn identity(directus: &Directus) -> Result<(String, String), Error> {
    let namespace = directus
        .namespace()
        .ok_or_else(|| Error::missing_field("metadata.namespace of Directus"))?;
    Ok((namespace, directus.name_any()))
}

/// Run one reconciliation pass for the Directus identified by `directus`
///
/// `directus` only supplies the identity: the current object is fetched
/// again so a resource deleted since it was queued is reported as
/// [`PassOutcome::Gone`] without any mutation.
pub async fn reconcile_directus(
    directus: &Directus,
    ctx: &Context,
    scope: &PassScope,
) -> Result<PassOutcome, Error> {
    let (namespace, name) = identity(directus)?;
    let store = ScopedStore::new(ctx.store.as_ref(), scope);

    let Some(mut current) = store.get_directus(&namespace, &name).await? else {
        info!("Directus not found, assuming it was deleted");
        return Ok(PassOutcome::Gone);
    };
    current.spec = std::mem::take(&mut current.spec).with_defaults();
    let owner = owner_reference(&current)?;

    let mut steps = Vec::with_capacity(ctx.steps.len());
    for step in &ctx.steps {
        scope.check()?;
        let outcome = step.converge(&store, &current, &owner).await?;
        steps.push((step.managed_kind(), outcome));
    }

    scope.check()?;
    let workload = store
        .get(ManagedKind::Deployment, &namespace, &workload_name(&current))
        .await
        .and_then(|found| found.map(from_dynamic::<Deployment>).transpose());
    let workload = match workload {
        Err(e) if e.is_cancelled() => return Err(e),
        other => other,
    };
    let status = aggregate_status(&current, workload);
    let phase = status.phase;

    let status_written = current.status.as_ref() != Some(&status);
    if status_written {
        store
            .patch_directus_status(&namespace, &name, &status)
            .await?;
        debug!(%phase, "status updated");
    }

    Ok(PassOutcome::Reconciled {
        phase,
        steps,
        status_written,
    })
}

/// Reconcile a Directus resource
///
/// Entry point for the controller runtime. A healthy pass requeues after the
/// configured resync interval; a Directus that is gone waits for the next
/// change.
#[instrument(skip(directus, ctx), fields(directus = %directus.name_any(), namespace = %directus.namespace().unwrap_or_default()))]
pub async fn reconcile(directus: Arc<Directus>, ctx: Arc<Context>) -> Result<Action, Error> {
    info!("reconciling directus");
    let scope = ctx.pass_scope();
    let key = format!(
        "{}/{}",
        directus.namespace().unwrap_or_default(),
        directus.name_any()
    );

    match reconcile_directus(&directus, &ctx, &scope).await? {
        PassOutcome::Gone => {
            ctx.clear_failures(&key);
            Ok(Action::await_change())
        }
        PassOutcome::Reconciled { phase, .. } => {
            ctx.clear_failures(&key);
            info!(%phase, "reconciliation complete");
            Ok(Action::requeue(ctx.config.requeue_interval()))
        }
    }
}

/// Error policy for the Directus controller
///
/// Requeues with exponential backoff per Directus, capped at five minutes.
pub fn error_policy(directus: Arc<Directus>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = format!(
        "{}/{}",
        directus.namespace().unwrap_or_default(),
        directus.name_any()
    );
    let failures = ctx.record_failure(&key);
    let delay = ctx.config.error_backoff(failures);

    warn!(
        %error,
        directus = %key,
        failures,
        delay_secs = delay.as_secs(),
        "reconciliation failed"
    );
    Action::requeue(delay)
}
