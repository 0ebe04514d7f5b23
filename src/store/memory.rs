//! In-memory object store
//!
//! Behaves like a minimal API server for the kinds the reconciler manages:
//! uids and resource versions are assigned on write, stale writes conflict,
//! and the fields the real server treats as immutable (Service `clusterIP`,
//! Deployment `selector`) reject changes. Every write is recorded so tests
//! can assert what a pass actually did.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::error::ErrorResponse;
use parking_lot::Mutex;

use super::ObjectStore;
use crate::crd::{Directus, DirectusStatus};
use crate::resources::ManagedKind;
use crate::Error;

/// Store operations, used to record writes and inject failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreOp {
    /// Fetch
    Get,
    /// Create
    Create,
    /// Replace
    Replace,
}

/// A write the store accepted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    /// Operation performed
    pub op: StoreOp,
    /// Kind written
    pub kind: ManagedKind,
    /// Object name
    pub name: String,
}

type ObjectKey = (ManagedKind, String, String);

struct InjectedFailure {
    message: String,
    /// Calls that still succeed before the failure applies
    skip: usize,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    directuses: BTreeMap<(String, String), Directus>,
    writes: Vec<WriteRecord>,
    status_writes: usize,
    failures: BTreeMap<(StoreOp, ManagedKind), InjectedFailure>,
    fail_status: Option<String>,
    revision: u64,
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }

    fn injected(&mut self, op: StoreOp, kind: ManagedKind) -> Result<(), Error> {
        match self.failures.get_mut(&(op, kind)) {
            Some(failure) if failure.skip > 0 => {
                failure.skip -= 1;
                Ok(())
            }
            Some(failure) => Err(api_error(500, "InternalError", failure.message.clone())),
            None => Ok(()),
        }
    }
}

fn api_error(code: u16, reason: &str, message: impl Into<String>) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.into(),
        reason: reason.to_string(),
        code,
    }))
}

fn object_name(kind: ManagedKind, object: &DynamicObject) -> Result<String, Error> {
    object
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::missing_field(format!("metadata.name of {kind}")))
}

/// Field paths the server refuses to change once set
fn immutable_field(kind: ManagedKind) -> Option<(&'static str, &'static str)> {
    match kind {
        ManagedKind::Service => Some(("spec", "clusterIP")),
        ManagedKind::Deployment => Some(("spec", "selector")),
        _ => None,
    }
}

/// Thread-safe in-memory [`ObjectStore`]
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a Directus, assigning a uid if it has none
    pub fn insert_directus(&self, mut directus: Directus) -> Directus {
        let mut state = self.state.lock();
        let namespace = directus.metadata.namespace.clone().unwrap_or_default();
        let name = directus.metadata.name.clone().unwrap_or_default();
        if directus.metadata.uid.is_none() {
            directus.metadata.uid = Some(format!("uid-{namespace}-{name}"));
        }
        directus.metadata.resource_version = Some(state.next_revision());
        state
            .directuses
            .insert((namespace, name), directus.clone());
        directus
    }

    /// Remove a Directus, simulating deletion by its owner
    pub fn remove_directus(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .directuses
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Current copy of a Directus
    pub fn directus(&self, namespace: &str, name: &str) -> Option<Directus> {
        self.state
            .lock()
            .directuses
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Current copy of a managed object
    pub fn object(&self, kind: ManagedKind, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.state
            .lock()
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Insert a managed object directly, bypassing the write log
    pub fn seed(&self, kind: ManagedKind, namespace: &str, mut object: DynamicObject) {
        let mut state = self.state.lock();
        let name = object.metadata.name.clone().unwrap_or_default();
        object.metadata.namespace = Some(namespace.to_string());
        object.metadata.resource_version = Some(state.next_revision());
        state
            .objects
            .insert((kind, namespace.to_string(), name), object);
    }

    /// Names of every stored object of a kind in a namespace
    pub fn names(&self, kind: ManagedKind, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .objects
            .keys()
            .filter(|(k, ns, _)| *k == kind && ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// Every accepted write, in order
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// Accepted writes of one operation and kind
    pub fn write_count(&self, op: StoreOp, kind: ManagedKind) -> usize {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.op == op && w.kind == kind)
            .count()
    }

    /// Number of accepted status writes
    pub fn status_writes(&self) -> usize {
        self.state.lock().status_writes
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        let mut state = self.state.lock();
        state.writes.clear();
        state.status_writes = 0;
    }

    /// Make every `op` on `kind` fail with a server error
    pub fn fail_on(&self, op: StoreOp, kind: ManagedKind, message: impl Into<String>) {
        self.fail_after(op, kind, 0, message);
    }

    /// Let the next `skip` calls of `op` on `kind` succeed, then fail every later one
    pub fn fail_after(
        &self,
        op: StoreOp,
        kind: ManagedKind,
        skip: usize,
        message: impl Into<String>,
    ) {
        self.state.lock().failures.insert(
            (op, kind),
            InjectedFailure {
                message: message.into(),
                skip,
            },
        );
    }

    /// Make status writes fail with a server error
    pub fn fail_status_writes(&self, message: impl Into<String>) {
        self.state.lock().fail_status = Some(message.into());
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failures.clear();
        state.fail_status = None;
    }

    /// Set the observed status of a stored Deployment
    pub fn set_workload_status(&self, namespace: &str, name: &str, replicas: i32, ready: i32) {
        let mut state = self.state.lock();
        let key = (ManagedKind::Deployment, namespace.to_string(), name.to_string());
        if let Some(obj) = state.objects.get_mut(&key) {
            obj.data["status"] = serde_json::json!({
                "replicas": replicas,
                "readyReplicas": ready,
            });
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_directus(&self, namespace: &str, name: &str) -> Result<Option<Directus>, Error> {
        Ok(self.directus(namespace, name))
    }

    async fn patch_directus_status(
        &self,
        namespace: &str,
        name: &str,
        status: &DirectusStatus,
    ) -> Result<(), Error> {
        let mut state = self.state.lock();
        if let Some(message) = &state.fail_status {
            return Err(api_error(500, "InternalError", message.clone()));
        }
        let revision = state.next_revision();
        let directus = state
            .directuses
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| api_error(404, "NotFound", format!("directuses \"{name}\" not found")))?;
        directus.status = Some(status.clone());
        directus.metadata.resource_version = Some(revision);
        state.status_writes += 1;
        Ok(())
    }

    async fn get(
        &self,
        kind: ManagedKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        let mut state = self.state.lock();
        state.injected(StoreOp::Get, kind)?;
        Ok(state
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(
        &self,
        kind: ManagedKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let mut state = self.state.lock();
        state.injected(StoreOp::Create, kind)?;

        let name = object_name(kind, object)?;
        let key = (kind, namespace.to_string(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{kind} \"{name}\" already exists"),
            ));
        }

        let mut stored = object.clone();
        let revision = state.next_revision();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.uid = Some(format!("uid-{kind}-{namespace}-{name}"));
        stored.metadata.resource_version = Some(revision.clone());
        if kind == ManagedKind::Service && stored.data["spec"]["clusterIP"].is_null() {
            stored.data["spec"]["clusterIP"] =
                serde_json::Value::String(format!("10.96.0.{}", state.revision % 250 + 1));
        }

        state.objects.insert(key, stored.clone());
        state.writes.push(WriteRecord {
            op: StoreOp::Create,
            kind,
            name,
        });
        Ok(stored)
    }

    async fn replace(
        &self,
        kind: ManagedKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let mut state = self.state.lock();
        state.injected(StoreOp::Replace, kind)?;

        let name = object_name(kind, object)?;
        let key = (kind, namespace.to_string(), name.clone());
        let current = state
            .objects
            .get(&key)
            .ok_or_else(|| api_error(404, "NotFound", format!("{kind} \"{name}\" not found")))?;

        if object.metadata.resource_version != current.metadata.resource_version {
            return Err(api_error(
                409,
                "Conflict",
                format!("the object has been modified; please apply your changes to the latest version of {kind} \"{name}\""),
            ));
        }
        if let Some((section, field)) = immutable_field(kind) {
            let before = &current.data[section][field];
            let after = &object.data[section][field];
            if !before.is_null() && before != after {
                return Err(api_error(
                    422,
                    "Invalid",
                    format!("{kind} \"{name}\" is invalid: {section}.{field}: field is immutable"),
                ));
            }
        }

        let mut stored = object.clone();
        stored.metadata.uid = current.metadata.uid.clone();
        if !current.data["status"].is_null() {
            stored.data["status"] = current.data["status"].clone();
        }
        stored.metadata.resource_version = Some(state.next_revision());

        state.objects.insert(key, stored.clone());
        state.writes.push(WriteRecord {
            op: StoreOp::Replace,
            kind,
            name,
        });
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;
    use crate::store::to_dynamic;

    fn config_map(name: &str) -> DynamicObject {
        to_dynamic(&ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryStore::new();
        let created = store
            .create(ManagedKind::ConfigMap, "cms", &config_map("a"))
            .await
            .unwrap();
        assert!(created.metadata.uid.is_some());

        let fetched = store.get(ManagedKind::ConfigMap, "cms", "a").await.unwrap();
        assert_eq!(fetched, Some(created));
        assert_eq!(
            store.get(ManagedKind::ConfigMap, "other", "a").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let store = InMemoryStore::new();
        store
            .create(ManagedKind::ConfigMap, "cms", &config_map("a"))
            .await
            .unwrap();
        let err = store
            .create(ManagedKind::ConfigMap, "cms", &config_map("a"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    /// Story: a write based on a stale read is rejected
    #[tokio::test]
    async fn story_stale_replace_conflicts() {
        let store = InMemoryStore::new();
        let created = store
            .create(ManagedKind::ConfigMap, "cms", &config_map("a"))
            .await
            .unwrap();

        store
            .replace(ManagedKind::ConfigMap, "cms", &created)
            .await
            .unwrap();
        let err = store
            .replace(ManagedKind::ConfigMap, "cms", &created)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has been modified"));
        assert_eq!(store.write_count(StoreOp::Replace, ManagedKind::ConfigMap), 1);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_server_errors() {
        let store = InMemoryStore::new();
        store.fail_on(StoreOp::Get, ManagedKind::Deployment, "etcd unavailable");

        let err = store
            .get(ManagedKind::Deployment, "cms", "blog")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("etcd unavailable"));
        assert!(!err.is_not_found());

        store.clear_failures();
        assert!(store
            .get(ManagedKind::Deployment, "cms", "blog")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delayed_failure_lets_earlier_calls_through() {
        let store = InMemoryStore::new();
        store.fail_after(StoreOp::Get, ManagedKind::Deployment, 1, "etcd unavailable");

        assert!(store
            .get(ManagedKind::Deployment, "cms", "blog")
            .await
            .is_ok());
        for _ in 0..2 {
            let err = store
                .get(ManagedKind::Deployment, "cms", "blog")
                .await
                .unwrap_err();
            assert!(err.to_string().contains("etcd unavailable"));
        }
    }
}
