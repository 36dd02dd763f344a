//! Events database descriptors: credentials, scripts, storage, PostgreSQL
//! deployment and service.

use super::{build, component_labels, memory, object_meta, secret_env, service};
use crate::config::DatabaseScripts;
use crate::error::ControllerError;
use cluster_client::{ManagedResource, ResourceKind};
use crds::AppService;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use serde_json::json;
use std::collections::BTreeMap;

pub const DATABASE_COMPONENT: &str = "events-database";
pub const DATABASE_CONTAINER: &str = "postgresql";
pub const DATABASE_PORT: i32 = 5432;
pub const DATABASE_PORT_NAME: &str = "postgresql";
pub const DATABASE_IMAGE: &str = "registry.access.redhat.com/rhscl/postgresql-10-rhel7:latest";

pub const CREDENTIALS_SECRET: &str = DATABASE_COMPONENT;
pub const SCRIPTS_CONFIG_MAP: &str = "events-database-scripts";
pub const SCRIPTS_MOUNT_PATH: &str = "/operator/scripts";
pub const DATA_CLAIM: &str = DATABASE_COMPONENT;
const DATA_VOLUME: &str = "events-database-data";
const DATA_CLAIM_SIZE: &str = "512Mi";

pub const DATABASE_NAME: &str = "eventsdb";
pub const DATABASE_USER: &str = "luke";
pub const DATABASE_PASSWORD: &str = "secret";

/// Keys of the credentials secret
pub const KEY_DATABASE_NAME: &str = "database-name";
pub const KEY_DATABASE_USER: &str = "database-user";
pub const KEY_DATABASE_PASSWORD: &str = "database-password";

pub fn credentials_secret(owner: &AppService) -> Result<ManagedResource, ControllerError> {
    let data = BTreeMap::from([
        (KEY_DATABASE_NAME.to_string(), ByteString(DATABASE_NAME.as_bytes().to_vec())),
        (KEY_DATABASE_PASSWORD.to_string(), ByteString(DATABASE_PASSWORD.as_bytes().to_vec())),
        (KEY_DATABASE_USER.to_string(), ByteString(DATABASE_USER.as_bytes().to_vec())),
    ]);
    Ok(ManagedResource::Secret(Secret {
        metadata: object_meta(owner, CREDENTIALS_SECRET, &component_labels(DATABASE_COMPONENT), None)?,
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }))
}

pub fn scripts_config_map(owner: &AppService, scripts: &DatabaseScripts) -> Result<ManagedResource, ControllerError> {
    let mut body = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap"
    });
    // the API server drops an empty map, so an empty one would always look drifted
    if !scripts.contents().is_empty() {
        body["data"] = json!(scripts.contents());
    }
    build(
        ResourceKind::ConfigMap,
        object_meta(owner, SCRIPTS_CONFIG_MAP, &component_labels(DATABASE_COMPONENT), None)?,
        body,
    )
}

pub fn data_claim(owner: &AppService) -> Result<ManagedResource, ControllerError> {
    build(
        ResourceKind::PersistentVolumeClaim,
        object_meta(owner, DATA_CLAIM, &component_labels(DATABASE_COMPONENT), None)?,
        json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "resources": { "requests": { "storage": DATA_CLAIM_SIZE } }
            }
        }),
    )
}

pub fn database_deployment(owner: &AppService) -> Result<ManagedResource, ControllerError> {
    let mut labels = component_labels(DATABASE_COMPONENT);
    labels.insert("app.kubernetes.io/name".to_string(), "postgresql".to_string());

    build(
        ResourceKind::Deployment,
        object_meta(owner, DATABASE_COMPONENT, &labels, None)?,
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "spec": {
                "replicas": 1,
                "selector": { "matchLabels": labels },
                "strategy": { "type": "Recreate" },
                "template": {
                    "metadata": { "labels": labels },
                    "spec": {
                        "containers": [{
                            "name": DATABASE_CONTAINER,
                            "image": DATABASE_IMAGE,
                            "imagePullPolicy": "IfNotPresent",
                            "ports": [{
                                "name": DATABASE_PORT_NAME,
                                "containerPort": DATABASE_PORT,
                                "protocol": "TCP"
                            }],
                            "env": [
                                secret_env("POSTGRESQL_USER", CREDENTIALS_SECRET, KEY_DATABASE_USER),
                                secret_env("POSTGRESQL_PASSWORD", CREDENTIALS_SECRET, KEY_DATABASE_PASSWORD),
                                secret_env("POSTGRESQL_DATABASE", CREDENTIALS_SECRET, KEY_DATABASE_NAME)
                            ],
                            "resources": memory("512Mi", "512Mi"),
                            "readinessProbe": {
                                "exec": { "command": ["/usr/libexec/check-container"] },
                                "initialDelaySeconds": 5,
                                "timeoutSeconds": 1,
                                "failureThreshold": 3
                            },
                            "livenessProbe": {
                                "exec": { "command": ["/usr/libexec/check-container", "--live"] },
                                "initialDelaySeconds": 120,
                                "timeoutSeconds": 10,
                                "failureThreshold": 3
                            },
                            "volumeMounts": [
                                { "name": DATA_VOLUME, "mountPath": "/var/lib/pgsql/data" },
                                { "name": SCRIPTS_CONFIG_MAP, "mountPath": SCRIPTS_MOUNT_PATH }
                            ]
                        }],
                        "volumes": [
                            { "name": DATA_VOLUME, "persistentVolumeClaim": { "claimName": DATA_CLAIM } },
                            { "name": SCRIPTS_CONFIG_MAP, "configMap": { "name": SCRIPTS_CONFIG_MAP } }
                        ]
                    }
                }
            }
        }),
    )
}

pub fn database_service(owner: &AppService) -> Result<ManagedResource, ControllerError> {
    service(owner, DATABASE_COMPONENT, DATABASE_PORT_NAME, DATABASE_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_app_service;

    #[test]
    fn test_secret_holds_credentials() {
        let app = create_test_app_service("gramola", "demo");
        let ManagedResource::Secret(secret) = credentials_secret(&app).expect("secret should build") else {
            panic!("expected a Secret");
        };
        let data = secret.data.expect("secret data should be set");
        assert_eq!(data.get(KEY_DATABASE_USER), Some(&ByteString(b"luke".to_vec())));
        assert_eq!(data.get(KEY_DATABASE_NAME), Some(&ByteString(b"eventsdb".to_vec())));
    }

    #[test]
    fn test_config_map_carries_scripts() {
        let app = create_test_app_service("gramola", "demo");
        let scripts = DatabaseScripts::from_contents(BTreeMap::from([(
            "update.sql".to_string(),
            "select 1;".to_string(),
        )]));
        let value = scripts_config_map(&app, &scripts)
            .expect("config map should build")
            .to_value()
            .expect("config map should serialize");
        assert_eq!(value["data"]["update.sql"], "select 1;");
        assert_eq!(value["metadata"]["name"], SCRIPTS_CONFIG_MAP);
    }

    #[test]
    fn test_config_map_without_scripts_has_no_data() {
        let app = create_test_app_service("gramola", "demo");
        let config_map = scripts_config_map(&app, &DatabaseScripts::default()).expect("config map should build");

        let value = config_map.to_value().expect("config map should serialize");
        assert!(value.get("data").is_none());

        let patch = crate::sync::desired_patch(&config_map).expect("patch should build");
        assert!(patch.get("data").is_none());
    }

    #[test]
    fn test_database_deployment_mounts_data_and_scripts() {
        let app = create_test_app_service("gramola", "demo");
        let value = database_deployment(&app)
            .expect("deployment should build")
            .to_value()
            .expect("deployment should serialize");

        assert_eq!(value["spec"]["replicas"], 1);
        assert_eq!(value["spec"]["strategy"]["type"], "Recreate");
        let container = &value["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["name"], DATABASE_CONTAINER);
        assert_eq!(container["volumeMounts"][1]["mountPath"], SCRIPTS_MOUNT_PATH);
        assert_eq!(value["spec"]["template"]["spec"]["volumes"][0]["persistentVolumeClaim"]["claimName"], DATA_CLAIM);
    }
}
