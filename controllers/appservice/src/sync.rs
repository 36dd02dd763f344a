//! Create-or-update of managed resources.
//!
//! Every descriptor is first created; when the name is already taken the
//! live object is compared with the fields this controller owns and patched
//! only when they drifted. Fields the API server or other controllers add
//! are left alone, so a converged object is never written again.

use crate::error::ControllerError;
use crate::metrics;
use cluster_client::{ClusterClientTrait, ClusterEvent, ManagedResource, ResourceKind};
use crds::AppService;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// What a sync did to the live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncVerb {
    Created,
    Patched,
    Unchanged,
}

impl SyncVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncVerb::Created => "created",
            SyncVerb::Patched => "patched",
            SyncVerb::Unchanged => "unchanged",
        }
    }
}

/// Ensures `desired` exists and matches on the fields we own.
///
/// Publishes a `<Kind> Created` or `<Kind> Patched` event against `owner`;
/// an unchanged object produces no event.
pub async fn sync_resource(
    client: &dyn ClusterClientTrait,
    owner: &AppService,
    desired: &ManagedResource,
) -> Result<SyncVerb, ControllerError> {
    let kind = desired.kind();
    let verb = match client.create_resource(desired).await {
        Ok(()) => SyncVerb::Created,
        Err(e) if e.is_already_exists() => {
            let current = client
                .get_resource(kind, desired.namespace(), desired.name())
                .await?
                .to_value()?;
            let patch = desired_patch(desired)?;
            if is_satisfied_by(&patch, &current) {
                SyncVerb::Unchanged
            } else {
                client
                    .patch_resource(kind, desired.namespace(), desired.name(), &patch)
                    .await?;
                SyncVerb::Patched
            }
        }
        Err(e) => return Err(e.into()),
    };

    metrics::increment_managed_resource_operations(kind.as_str(), verb.as_str());
    let action = match verb {
        SyncVerb::Created => "Created",
        SyncVerb::Patched => "Patched",
        SyncVerb::Unchanged => {
            debug!("{} is up to date", desired.describe());
            return Ok(verb);
        }
    };
    info!("{} {}", action, desired.describe());
    let event = ClusterEvent::normal(
        format!("{} {}", kind, action),
        "Reconciling",
        format!("{} {} {}", action, desired.name(), kind),
    );
    // the write already happened; a lost event must not fail the sync
    if let Err(e) = client.publish_event(owner, &event).await {
        warn!("Failed to publish {} event for {}: {}", event.reason, desired.describe(), e);
    }
    Ok(verb)
}

/// Merge patch holding only the fields this controller owns for the kind.
///
/// Immutable fields are never part of it: a Deployment's `spec.selector`
/// and a claim's `spec` stay as created.
pub fn desired_patch(desired: &ManagedResource) -> Result<Value, ControllerError> {
    let value = desired.to_value()?;
    let mut patch = Map::new();

    let mut metadata = Map::new();
    copy_field(&value["metadata"], "labels", &mut metadata);
    copy_field(&value["metadata"], "annotations", &mut metadata);
    copy_field(&value["metadata"], "ownerReferences", &mut metadata);
    patch.insert("metadata".to_string(), Value::Object(metadata));

    let owned_spec_fields: &[&str] = match desired.kind() {
        ResourceKind::Secret | ResourceKind::ConfigMap => {
            copy_field(&value, "data", &mut patch);
            &[]
        }
        ResourceKind::PersistentVolumeClaim => &[],
        ResourceKind::Deployment => &["replicas", "strategy", "template"],
        ResourceKind::Service => &["ports", "selector"],
        ResourceKind::Route => &["to", "port"],
        ResourceKind::Ingress => &["rules"],
    };
    if !owned_spec_fields.is_empty() {
        let mut spec = Map::new();
        for field in owned_spec_fields {
            copy_field(&value["spec"], field, &mut spec);
        }
        patch.insert("spec".to_string(), Value::Object(spec));
    }

    Ok(Value::Object(patch))
}

fn copy_field(source: &Value, field: &str, target: &mut Map<String, Value>) {
    if let Some(v) = source.get(field).filter(|v| !v.is_null()) {
        target.insert(field.to_string(), v.clone());
    }
}

/// True when applying `patch` to `current` would not change it.
///
/// Objects match key by key, recursively; keys present only in `current`
/// are ignored. Lists must have the same length and match element-wise.
/// A `null` in the patch requires the key to be absent.
pub fn is_satisfied_by(patch: &Value, current: &Value) -> bool {
    match (patch, current) {
        (Value::Object(wanted), Value::Object(have)) => wanted.iter().all(|(key, value)| match have.get(key) {
            Some(existing) => !value.is_null() && is_satisfied_by(value, existing),
            None => value.is_null(),
        }),
        (Value::Object(wanted), _) => wanted.values().all(Value::is_null),
        (Value::Array(wanted), Value::Array(have)) => {
            wanted.len() == have.len() && wanted.iter().zip(have).all(|(w, h)| is_satisfied_by(w, h))
        }
        (wanted, have) => wanted == have,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{database, workloads};
    use crate::test_utils::create_test_app_service;
    use cluster_client::{ClusterClientTrait, MockClusterClient};
    use serde_json::json;

    #[test]
    fn test_server_added_fields_do_not_count_as_drift() {
        let patch = json!({"spec": {"ports": [{"name": "http", "port": 8080}]}});
        let current = json!({
            "spec": {
                "clusterIP": "10.0.0.1",
                "ports": [{"name": "http", "port": 8080, "targetPort": 8080, "protocol": "TCP"}]
            }
        });
        assert!(is_satisfied_by(&patch, &current));
    }

    #[test]
    fn test_changed_or_extra_list_items_are_drift() {
        let patch = json!({"spec": {"ports": [{"port": 8080}]}});
        assert!(!is_satisfied_by(&patch, &json!({"spec": {"ports": [{"port": 9090}]}})));
        assert!(!is_satisfied_by(&patch, &json!({"spec": {"ports": [{"port": 8080}, {"port": 9090}]}})));
    }

    #[test]
    fn test_deployment_patch_never_touches_selector() {
        let app = create_test_app_service("gramola", "demo");
        let deployment = workloads::gateway_deployment(&app).expect("deployment should build");
        let patch = desired_patch(&deployment).expect("patch should build");

        assert!(patch["spec"].get("selector").is_none());
        assert!(patch["spec"].get("template").is_some());
        assert_eq!(patch["spec"]["replicas"], 2);
    }

    #[tokio::test]
    async fn test_sync_creates_then_leaves_converged_object_alone() {
        let client = MockClusterClient::new();
        let app = create_test_app_service("gramola", "demo");
        let secret = database::credentials_secret(&app).expect("secret should build");

        let first = sync_resource(&client, &app, &secret).await.expect("first sync");
        let second = sync_resource(&client, &app, &secret).await.expect("second sync");

        assert_eq!(first, SyncVerb::Created);
        assert_eq!(second, SyncVerb::Unchanged);
        assert_eq!(client.resource_writes(), 1);
        assert_eq!(client.event_reasons(), vec!["Secret Created".to_string()]);
    }

    #[tokio::test]
    async fn test_sync_restores_drifted_fields() {
        let client = MockClusterClient::new();
        let app = create_test_app_service("gramola", "demo");
        let deployment = workloads::events_deployment(&app).expect("deployment should build");
        sync_resource(&client, &app, &deployment).await.expect("create");

        client
            .patch_resource(ResourceKind::Deployment, "demo", "events", &json!({"spec": {"replicas": 5}}))
            .await
            .expect("manual scale");

        let verb = sync_resource(&client, &app, &deployment).await.expect("resync");
        assert_eq!(verb, SyncVerb::Patched);

        let value = client
            .resource(ResourceKind::Deployment, "demo", "events")
            .expect("deployment stored")
            .to_value()
            .expect("deployment should serialize");
        assert_eq!(value["spec"]["replicas"], 2);
        assert_eq!(client.event_reasons().last().map(String::as_str), Some("Deployment Patched"));
    }

    #[tokio::test]
    async fn test_create_failure_propagates() {
        let client = MockClusterClient::new();
        client.fail_create(ResourceKind::ConfigMap, "quota exceeded");
        let app = create_test_app_service("gramola", "demo");
        let config_map = database::scripts_config_map(&app, &crate::test_utils::create_test_scripts())
            .expect("config map should build");

        let result = sync_resource(&client, &app, &config_map).await;
        assert!(matches!(result, Err(ControllerError::Cluster(_))));
        assert!(client.events().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_event_does_not_fail_sync() {
        let client = MockClusterClient::new();
        client.fail_events("events are forbidden");
        let app = create_test_app_service("gramola", "demo");
        let secret = database::credentials_secret(&app).expect("secret should build");

        let verb = sync_resource(&client, &app, &secret).await.expect("sync should succeed");

        assert_eq!(verb, SyncVerb::Created);
        assert_eq!(client.resource_writes(), 1);
        assert!(client.events().is_empty());
    }
}
