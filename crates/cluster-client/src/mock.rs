//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClientTrait`
//! so reconcilers can be exercised without an API server. It keeps enough
//! API-server behaviour to make reconciliation tests meaningful:
//! `resourceVersion` preconditions, generation bumps on spec changes,
//! `AlreadyExists` on duplicate creates and RFC 7386 merge patches.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::models::{ClusterEvent, ExecOutput, ManagedResource, ResourceKind};
use crds::AppService;
use k8s_openapi::api::core::v1::Pod;
use kube::error::ErrorResponse;
use kube::ResourceExt;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type ObjectKey = (String, String);
type ResourceKey = (ResourceKind, String, String);

/// A recorded `exec_in_pod` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub command: Vec<String>,
}

#[derive(Default)]
struct MockState {
    app_services: HashMap<ObjectKey, AppService>,
    resources: BTreeMap<ResourceKey, Value>,
    pods: Vec<Pod>,
    exec_response: Option<Result<ExecOutput, String>>,
    exec_hangs: bool,
    exec_calls: Vec<ExecCall>,
    events: Vec<(ObjectKey, ClusterEvent)>,
    resource_writes: usize,
    next_resource_version: u64,
    create_failures: HashMap<ResourceKind, String>,
    status_update_failures: usize,
    event_failure: Option<String>,
}

impl MockState {
    fn bump_resource_version(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }
}

/// Mock ClusterClient for testing
///
/// Clones share the same store, so a test can hand one clone to the
/// reconciler and inspect the other.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    state: Arc<Mutex<MockState>>,
}

fn object_key(app: &AppService) -> ObjectKey {
    (app.namespace().unwrap_or_default(), app.name_any())
}

fn injected_failure(message: &str) -> ClusterError {
    ClusterError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

impl MockClusterClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an AppService to the mock store (for test setup)
    ///
    /// Missing `uid`, `generation` and `resourceVersion` are filled in the
    /// way the API server would on create.
    pub fn add_app_service(&self, mut app: AppService) {
        let mut state = self.state();
        let rv = state.bump_resource_version();
        let key = object_key(&app);
        app.metadata.resource_version = Some(rv);
        app.metadata.generation.get_or_insert(1);
        app.metadata
            .uid
            .get_or_insert_with(|| format!("uid-{}-{}", key.0, key.1));
        state.app_services.insert(key, app);
    }

    /// Current stored copy of an AppService
    pub fn app_service(&self, namespace: &str, name: &str) -> Option<AppService> {
        self.state()
            .app_services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Remove an AppService, as if it had been deleted
    pub fn remove_app_service(&self, namespace: &str, name: &str) {
        self.state()
            .app_services
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Add a pod to the mock store (for test setup)
    pub fn add_pod(&self, pod: Pod) {
        self.state().pods.push(pod);
    }

    /// Replace every stored pod
    pub fn set_pods(&self, pods: Vec<Pod>) {
        self.state().pods = pods;
    }

    /// Output (or transport error message) returned by every subsequent exec
    pub fn set_exec_response(&self, response: Result<ExecOutput, String>) {
        self.state().exec_response = Some(response);
    }

    /// Make every subsequent exec block forever, like a stuck remote command
    pub fn hang_exec(&self) {
        self.state().exec_hangs = true;
    }

    pub fn exec_calls(&self) -> Vec<ExecCall> {
        self.state().exec_calls.clone()
    }

    /// Events published so far, in order
    pub fn events(&self) -> Vec<ClusterEvent> {
        self.state().events.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Reasons of the events published so far, in order
    pub fn event_reasons(&self) -> Vec<String> {
        self.state().events.iter().map(|(_, e)| e.reason.clone()).collect()
    }

    /// Stored managed resource, if any
    pub fn resource(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<ManagedResource> {
        let value = self
            .state()
            .resources
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()?;
        ManagedResource::from_value(kind, value).ok()
    }

    /// Store a managed resource directly, bypassing create (for test setup)
    pub fn put_resource(&self, resource: &ManagedResource) -> Result<(), ClusterError> {
        let value = resource.to_value()?;
        self.state().resources.insert(
            (resource.kind(), resource.namespace().to_string(), resource.name().to_string()),
            value,
        );
        Ok(())
    }

    /// Snapshot of every managed resource as JSON, keyed by kind/namespace/name
    pub fn resource_snapshot(&self) -> BTreeMap<(ResourceKind, String, String), Value> {
        self.state().resources.clone()
    }

    /// Number of creates and effective patches applied to managed resources
    pub fn resource_writes(&self) -> usize {
        self.state().resource_writes
    }

    /// Make every create of `kind` fail with `message`
    pub fn fail_create(&self, kind: ResourceKind, message: impl Into<String>) {
        self.state().create_failures.insert(kind, message.into());
    }

    /// Make the next `count` status updates fail
    pub fn fail_next_status_updates(&self, count: usize) {
        self.state().status_update_failures = count;
    }

    /// Make every event publish fail with `message`
    pub fn fail_events(&self, message: impl Into<String>) {
        self.state().event_failure = Some(message.into());
    }

    fn check_resource_version(stored: &AppService, incoming: &AppService) -> Result<(), ClusterError> {
        match incoming.metadata.resource_version.as_deref() {
            Some(rv) if Some(rv) != stored.metadata.resource_version.as_deref() => Err(ClusterError::Conflict(format!(
                "AppService {}: resourceVersion {} is stale",
                stored.name_any(),
                rv
            ))),
            _ => Ok(()),
        }
    }
}

/// Applies an RFC 7386 JSON merge patch to `target`.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                apply_merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn matches_selector(pod: &Pod, selector: &str) -> bool {
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term),
        })
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_app_service(&self, namespace: &str, name: &str) -> Result<AppService, ClusterError> {
        self.app_service(namespace, name)
            .ok_or_else(|| ClusterError::NotFound(format!("AppService {}/{}", namespace, name)))
    }

    async fn replace_app_service(&self, app: &AppService) -> Result<AppService, ClusterError> {
        let key = object_key(app);
        let mut state = self.state();
        let stored = state
            .app_services
            .get(&key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("AppService {}/{}", key.0, key.1)))?;
        Self::check_resource_version(&stored, app)?;

        let mut updated = app.clone();
        // status is a subresource and survives a replace untouched
        updated.status = stored.status.clone();
        let generation = stored.metadata.generation.unwrap_or(1);
        updated.metadata.generation = Some(if stored.spec == app.spec { generation } else { generation + 1 });
        updated.metadata.uid = stored.metadata.uid.clone();
        updated.metadata.resource_version = Some(state.bump_resource_version());
        state.app_services.insert(key, updated.clone());
        Ok(updated)
    }

    async fn update_app_service_status(&self, app: &AppService) -> Result<AppService, ClusterError> {
        let key = object_key(app);
        let mut state = self.state();
        if state.status_update_failures > 0 {
            state.status_update_failures -= 1;
            return Err(injected_failure("injected status update failure"));
        }
        let mut stored = state
            .app_services
            .get(&key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("AppService {}/{}", key.0, key.1)))?;
        Self::check_resource_version(&stored, app)?;

        // merged the way the API server applies a merge patch to the subresource
        let mut status = serde_json::to_value(&stored.status)?;
        apply_merge_patch(&mut status, &serde_json::to_value(&app.status)?);
        stored.status = serde_json::from_value(status)?;
        stored.metadata.resource_version = Some(state.bump_resource_version());
        state.app_services.insert(key, stored.clone());
        Ok(stored)
    }

    async fn create_resource(&self, resource: &ManagedResource) -> Result<(), ClusterError> {
        let key = (resource.kind(), resource.namespace().to_string(), resource.name().to_string());
        let mut state = self.state();
        if let Some(message) = state.create_failures.get(&resource.kind()) {
            return Err(injected_failure(message));
        }
        if state.resources.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(resource.describe()));
        }
        let value = resource.to_value()?;
        state.resources.insert(key, value);
        state.resource_writes += 1;
        Ok(())
    }

    async fn get_resource(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ManagedResource, ClusterError> {
        let value = self
            .state()
            .resources
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("{} {}/{}", kind, namespace, name)))?;
        ManagedResource::from_value(kind, value)
    }

    async fn patch_resource(&self, kind: ResourceKind, namespace: &str, name: &str, patch: &Value) -> Result<(), ClusterError> {
        let mut state = self.state();
        let current = state
            .resources
            .get_mut(&(kind, namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClusterError::NotFound(format!("{} {}/{}", kind, namespace, name)))?;
        let mut merged = current.clone();
        apply_merge_patch(&mut merged, patch);
        if merged != *current {
            *current = merged;
            state.resource_writes += 1;
        }
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, ClusterError> {
        Ok(self
            .state()
            .pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| matches_selector(pod, label_selector))
            .cloned()
            .collect())
    }

    async fn exec_in_pod(&self, namespace: &str, pod: &str, container: &str, command: &[String]) -> Result<ExecOutput, ClusterError> {
        let (hangs, response) = {
            let mut state = self.state();
            state.exec_calls.push(ExecCall {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
                container: container.to_string(),
                command: command.to_vec(),
            });
            (state.exec_hangs, state.exec_response.clone())
        };
        if hangs {
            std::future::pending::<()>().await;
        }
        match response {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(ClusterError::Exec(message)),
            None => Ok(ExecOutput::default()),
        }
    }

    async fn publish_event(&self, app: &AppService, event: &ClusterEvent) -> Result<(), ClusterError> {
        let mut state = self.state();
        if let Some(message) = &state.event_failure {
            return Err(injected_failure(message));
        }
        state.events.push((object_key(app), event.clone()));
        Ok(())
    }
}
