//! Deployments and services of the three gramola web components.

use super::database::{
    CREDENTIALS_SECRET, DATABASE_COMPONENT, DATABASE_PORT, KEY_DATABASE_NAME, KEY_DATABASE_PASSWORD,
    KEY_DATABASE_USER,
};
use super::{build, component_labels, http_probe, memory, object_meta, openshift_annotations, plain_env, secret_env, service};
use crate::error::ControllerError;
use cluster_client::{ManagedResource, ResourceKind};
use crds::AppService;
use serde_json::{json, Value};

pub const EVENTS_COMPONENT: &str = "events";
pub const GATEWAY_COMPONENT: &str = "gateway";
pub const FRONTEND_COMPONENT: &str = "frontend";

/// Port every web component listens on
pub const HTTP_PORT: i32 = 8080;
pub const HTTP_PORT_NAME: &str = "http";

const EVENTS_IMAGE: &str = "quay.io/cvicensa/gramola-events:0.0.2";
const GATEWAY_IMAGE: &str = "quay.io/cvicensa/gramola-gateway:0.0.2";
const FRONTEND_IMAGE: &str = "quay.io/cvicensa/gramola-frontend:0.0.2";

const WEB_REPLICAS: i32 = 2;

/// Parameters that differ between the web components.
struct WebComponent<'a> {
    name: &'a str,
    /// Runtime label, shown as the topology icon on OpenShift
    runtime: &'a str,
    image: &'a str,
    connects_to: &'a str,
    env: Vec<Value>,
    resources: Value,
    readiness: Value,
    liveness: Value,
}

fn web_deployment(owner: &AppService, component: WebComponent<'_>) -> Result<ManagedResource, ControllerError> {
    let mut labels = component_labels(component.name);
    labels.insert("app.kubernetes.io/name".to_string(), component.runtime.to_string());

    build(
        ResourceKind::Deployment,
        object_meta(owner, component.name, &labels, Some(openshift_annotations(component.connects_to)))?,
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "spec": {
                "replicas": WEB_REPLICAS,
                "selector": { "matchLabels": labels },
                "strategy": {
                    "type": "RollingUpdate",
                    "rollingUpdate": { "maxSurge": "25%", "maxUnavailable": "25%" }
                },
                "template": {
                    "metadata": { "labels": labels },
                    "spec": {
                        "containers": [{
                            "name": component.name,
                            "image": component.image,
                            "imagePullPolicy": "Always",
                            "ports": [{
                                "name": HTTP_PORT_NAME,
                                "containerPort": HTTP_PORT,
                                "protocol": "TCP"
                            }],
                            "env": component.env,
                            "resources": component.resources,
                            "readinessProbe": component.readiness,
                            "livenessProbe": component.liveness
                        }]
                    }
                }
            }
        }),
    )
}

/// The events API, backed by the events database.
pub fn events_deployment(owner: &AppService) -> Result<ManagedResource, ControllerError> {
    web_deployment(
        owner,
        WebComponent {
            name: EVENTS_COMPONENT,
            runtime: "java",
            image: EVENTS_IMAGE,
            connects_to: DATABASE_COMPONENT,
            env: vec![
                secret_env("DB_USERNAME", CREDENTIALS_SECRET, KEY_DATABASE_USER),
                secret_env("DB_PASSWORD", CREDENTIALS_SECRET, KEY_DATABASE_PASSWORD),
                secret_env("DB_NAME", CREDENTIALS_SECRET, KEY_DATABASE_NAME),
                plain_env("DB_SERVICE_NAME", DATABASE_COMPONENT),
                plain_env("DB_SERVICE_PORT", &DATABASE_PORT.to_string()),
            ],
            resources: memory("512Mi", "512Mi"),
            readiness: http_probe("/api/events", HTTP_PORT, 20, 3),
            liveness: http_probe("/api/events", HTTP_PORT, 22, 3),
        },
    )
}

pub fn gateway_deployment(owner: &AppService) -> Result<ManagedResource, ControllerError> {
    web_deployment(
        owner,
        WebComponent {
            name: GATEWAY_COMPONENT,
            runtime: "java",
            image: GATEWAY_IMAGE,
            connects_to: EVENTS_COMPONENT,
            env: vec![plain_env("NODE_ENV", "production")],
            resources: memory("200Mi", "256Mi"),
            readiness: http_probe("/api/events", HTTP_PORT, 25, 3),
            liveness: http_probe("/api/events", HTTP_PORT, 27, 3),
        },
    )
}

pub fn frontend_deployment(owner: &AppService) -> Result<ManagedResource, ControllerError> {
    web_deployment(
        owner,
        WebComponent {
            name: FRONTEND_COMPONENT,
            runtime: "nodejs",
            image: FRONTEND_IMAGE,
            connects_to: GATEWAY_COMPONENT,
            env: vec![plain_env("NODE_ENV", "production")],
            resources: memory("200Mi", "256Mi"),
            readiness: http_probe("/api/health", HTTP_PORT, 26, 5),
            liveness: http_probe("/api/health", HTTP_PORT, 28, 3),
        },
    )
}

/// ClusterIP service in front of a web component.
pub fn web_service(owner: &AppService, component: &str) -> Result<ManagedResource, ControllerError> {
    service(owner, component, HTTP_PORT_NAME, HTTP_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_app_service;

    fn deployment_value(resource: ManagedResource) -> Value {
        assert_eq!(resource.kind(), ResourceKind::Deployment);
        resource.to_value().expect("deployment should serialize")
    }

    #[test]
    fn test_events_deployment_reads_credentials_from_secret() {
        let app = create_test_app_service("gramola", "demo");
        let value = deployment_value(events_deployment(&app).expect("events deployment"));

        let container = &value["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["image"], EVENTS_IMAGE);
        let env = container["env"].as_array().expect("env should be a list");
        let user = env.iter().find(|e| e["name"] == "DB_USERNAME").expect("DB_USERNAME present");
        assert_eq!(user["valueFrom"]["secretKeyRef"]["name"], CREDENTIALS_SECRET);
        assert_eq!(user["valueFrom"]["secretKeyRef"]["key"], KEY_DATABASE_USER);
        let port = env.iter().find(|e| e["name"] == "DB_SERVICE_PORT").expect("DB_SERVICE_PORT present");
        assert_eq!(port["value"], "5432");
        assert_eq!(value["metadata"]["annotations"]["app.openshift.io/connects-to"], DATABASE_COMPONENT);
    }

    #[test]
    fn test_selector_matches_template_labels() {
        let app = create_test_app_service("gramola", "demo");
        for resource in [
            events_deployment(&app),
            gateway_deployment(&app),
            frontend_deployment(&app),
        ] {
            let value = deployment_value(resource.expect("deployment"));
            assert_eq!(value["spec"]["selector"]["matchLabels"], value["spec"]["template"]["metadata"]["labels"]);
            assert_eq!(value["spec"]["replicas"], WEB_REPLICAS);
            assert!(value["spec"]["selector"]["matchLabels"].get("version").is_none());
        }
    }

    #[test]
    fn test_frontend_probes_health_endpoint() {
        let app = create_test_app_service("gramola", "demo");
        let value = deployment_value(frontend_deployment(&app).expect("frontend deployment"));

        let container = &value["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["readinessProbe"]["httpGet"]["path"], "/api/health");
        assert_eq!(container["readinessProbe"]["failureThreshold"], 5);
        assert_eq!(container["resources"]["limits"]["memory"], "256Mi");
    }
}
