//! Cancellation and timeout scope for a single reconciliation pass
//!
//! A [`PassScope`] is created by the caller of a pass. Steps check it before
//! they start, and [`ScopedStore`] races every store call against it, so a
//! cancelled or expired pass abandons the remaining chain instead of running
//! it to completion.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::DynamicObject;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::crd::{Directus, DirectusStatus};
use crate::resources::ManagedKind;
use crate::store::ObjectStore;
use crate::Error;

/// Caller-supplied cancellation token and deadline for one pass
#[derive(Clone, Debug)]
pub struct PassScope {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl PassScope {
    /// Scope that expires `timeout` from now or when `token` is cancelled
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// Scope that is never cancelled and expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(CancellationToken::new(), timeout)
    }

    /// Fail if the pass was cancelled or its deadline has passed
    pub fn check(&self) -> Result<(), Error> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(Error::Timeout(self.timeout));
        }
        Ok(())
    }

    /// Run `fut` unless the scope ends first
    pub async fn run<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout_at(self.deadline, fut) => {
                result.map_err(|_| Error::Timeout(self.timeout))?
            }
        }
    }
}

/// [`ObjectStore`] wrapper that bounds every call by a [`PassScope`]
pub struct ScopedStore<'a> {
    inner: &'a dyn ObjectStore,
    scope: &'a PassScope,
}

impl<'a> ScopedStore<'a> {
    /// Wrap `inner` so its calls end with `scope`
    pub fn new(inner: &'a dyn ObjectStore, scope: &'a PassScope) -> Self {
        Self { inner, scope }
    }
}

#[async_trait]
impl ObjectStore for ScopedStore<'_> {
    async fn get_directus(&self, namespace: &str, name: &str) -> Result<Option<Directus>, Error> {
        self.scope
            .run(self.inner.get_directus(namespace, name))
            .await
    }

    async fn patch_directus_status(
        &self,
        namespace: &str,
        name: &str,
        status: &DirectusStatus,
    ) -> Result<(), Error> {
        self.scope
            .run(self.inner.patch_directus_status(namespace, name, status))
            .await
    }

    async fn get(
        &self,
        kind: ManagedKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        self.scope.run(self.inner.get(kind, namespace, name)).await
    }

    async fn create(
        &self,
        kind: ManagedKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        self.scope.run(self.inner.create(kind, namespace, object)).await
    }

    async fn replace(
        &self,
        kind: ManagedKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        self.scope
            .run(self.inner.replace(kind, namespace, object))
            .await
    }
}
