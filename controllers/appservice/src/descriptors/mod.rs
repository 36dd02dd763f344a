//! Managed resource descriptors.
//!
//! Pure builders turning an `AppService` into the objects it owns. Names
//! are fixed per component, so the identity of every managed resource is a
//! function of the owner's namespace alone. Each descriptor carries a
//! controller owner reference; garbage collection of the owner removes them.
//!
//! Object bodies are written as JSON manifests and decoded into the typed
//! `ManagedResource`, which keeps them readable next to the YAML they end
//! up as.

pub mod database;
pub mod exposure;
pub mod workloads;

use crate::error::ControllerError;
use cluster_client::{ManagedResource, ResourceKind};
use crds::AppService;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Value of the `app` label on everything we manage
pub const APP_NAME: &str = "gramola";

/// Operator version stamped on managed object metadata
pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

const VCS_URI: &str = "https://github.com/cvicens/gramola";
const VCS_REF: &str = "master";

/// Labels identifying a component. Used for selectors and pod templates,
/// so they must never change once a deployment exists.
pub fn component_labels(component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP_NAME.to_string()),
        ("component".to_string(), component.to_string()),
        ("app.kubernetes.io/component".to_string(), component.to_string()),
        ("app.kubernetes.io/instance".to_string(), component.to_string()),
        ("app.kubernetes.io/part-of".to_string(), format!("{}-app", APP_NAME)),
    ])
}

/// Controller owner reference pointing at `owner`.
pub fn owner_reference(owner: &AppService) -> Result<OwnerReference, ControllerError> {
    owner
        .controller_owner_ref(&())
        .ok_or_else(|| ControllerError::Descriptor {
            kind: "OwnerReference",
            reason: "AppService has no name or uid".to_string(),
        })
}

/// Object metadata for a managed resource named `name`.
///
/// `selector_labels` are extended with the operator version label, which
/// only ever appears on object metadata.
pub(crate) fn object_meta(
    owner: &AppService,
    name: &str,
    selector_labels: &BTreeMap<String, String>,
    annotations: Option<BTreeMap<String, String>>,
) -> Result<ObjectMeta, ControllerError> {
    let namespace = owner
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| ControllerError::Descriptor {
            kind: "ObjectMeta",
            reason: "AppService has no namespace".to_string(),
        })?;

    let mut labels = selector_labels.clone();
    labels.insert("version".to_string(), OPERATOR_VERSION.to_string());

    Ok(ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace),
        labels: Some(labels),
        annotations,
        owner_references: Some(vec![owner_reference(owner)?]),
        ..Default::default()
    })
}

/// Decodes a JSON manifest body into a typed resource, attaching `metadata`.
pub(crate) fn build(kind: ResourceKind, metadata: ObjectMeta, mut body: Value) -> Result<ManagedResource, ControllerError> {
    let descriptor_error = |reason: String| ControllerError::Descriptor {
        kind: kind.as_str(),
        reason,
    };
    let metadata = serde_json::to_value(&metadata).map_err(|e| descriptor_error(e.to_string()))?;
    if let Value::Object(map) = &mut body {
        map.insert("metadata".to_string(), metadata);
    }
    ManagedResource::from_value(kind, body).map_err(|e| descriptor_error(e.to_string()))
}

pub(crate) fn openshift_annotations(connects_to: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.openshift.io/connects-to".to_string(), connects_to.to_string()),
        ("app.openshift.io/vcs-ref".to_string(), VCS_REF.to_string()),
        ("app.openshift.io/vcs-uri".to_string(), VCS_URI.to_string()),
    ])
}

pub(crate) fn secret_env(name: &str, secret: &str, key: &str) -> Value {
    json!({
        "name": name,
        "valueFrom": { "secretKeyRef": { "name": secret, "key": key } }
    })
}

pub(crate) fn plain_env(name: &str, value: &str) -> Value {
    json!({ "name": name, "value": value })
}

pub(crate) fn memory(request: &str, limit: &str) -> Value {
    json!({
        "requests": { "memory": request },
        "limits": { "memory": limit }
    })
}

/// HTTP probe polling every 2s with a 1s timeout.
pub(crate) fn http_probe(path: &str, port: i32, initial_delay: i32, failure_threshold: i32) -> Value {
    json!({
        "httpGet": { "path": path, "port": port, "scheme": "HTTP" },
        "initialDelaySeconds": initial_delay,
        "periodSeconds": 2,
        "successThreshold": 1,
        "timeoutSeconds": 1,
        "failureThreshold": failure_threshold
    })
}

/// ClusterIP service exposing a single named TCP port of `component`.
pub(crate) fn service(owner: &AppService, component: &str, port_name: &str, port: i32) -> Result<ManagedResource, ControllerError> {
    let labels = component_labels(component);
    build(
        ResourceKind::Service,
        object_meta(owner, component, &labels, None)?,
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "spec": {
                "ports": [{ "name": port_name, "port": port, "protocol": "TCP" }],
                "selector": labels
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_app_service;

    #[test]
    fn test_object_meta_carries_owner_and_version() {
        let app = create_test_app_service("gramola", "demo");
        let meta = object_meta(&app, "events", &component_labels("events"), None).expect("meta should build");

        assert_eq!(meta.namespace.as_deref(), Some("demo"));
        let labels = meta.labels.expect("labels should be set");
        assert_eq!(labels.get("version").map(String::as_str), Some(OPERATOR_VERSION));
        assert_eq!(labels.get("component").map(String::as_str), Some("events"));

        let owners = meta.owner_references.expect("owner references should be set");
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "AppService");
        assert_eq!(owners[0].name, "gramola");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn test_missing_uid_fails_descriptor() {
        let mut app = create_test_app_service("gramola", "demo");
        app.metadata.uid = None;
        let result = object_meta(&app, "events", &component_labels("events"), None);
        assert!(matches!(result, Err(ControllerError::Descriptor { .. })));
    }

    #[test]
    fn test_selector_labels_have_no_version() {
        assert!(!component_labels("gateway").contains_key("version"));
    }
}
