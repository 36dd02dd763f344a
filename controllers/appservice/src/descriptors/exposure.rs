//! Public exposure of web components: a Route on OpenShift, an Ingress
//! everywhere else.

use super::workloads::HTTP_PORT;
use super::{build, component_labels, object_meta};
use crate::error::ControllerError;
use cluster_client::{ManagedResource, ResourceKind};
use crds::{AppService, Platform, Route, RoutePort, RouteSpec, RouteTargetReference, DEFAULT_DOMAIN_NAME};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::json;
use std::collections::BTreeMap;

const INGRESS_PATH: &str = "/(.*)";
const REWRITE_TARGET_ANNOTATION: &str = "nginx.ingress.kubernetes.io/rewrite-target";

/// Route or Ingress for `component`, depending on the owner's platform.
pub fn public_exposure(owner: &AppService, component: &str) -> Result<ManagedResource, ControllerError> {
    match owner.spec.platform() {
        Some(Platform::OpenShift) => route(owner, component),
        Some(Platform::Kubernetes) | None => ingress(owner, component),
    }
}

pub fn route(owner: &AppService, component: &str) -> Result<ManagedResource, ControllerError> {
    let mut route = Route::new(
        component,
        RouteSpec {
            host: None,
            path: None,
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: component.to_string(),
                weight: Some(100),
            },
            port: Some(RoutePort {
                target_port: IntOrString::Int(HTTP_PORT),
            }),
        },
    );
    route.metadata = object_meta(owner, component, &component_labels(component), None)?;
    Ok(ManagedResource::Route(route))
}

/// Host name an ingress publishes `component` under.
pub fn ingress_host(owner: &AppService, component: &str) -> String {
    let namespace = owner.metadata.namespace.as_deref().unwrap_or_default();
    let domain = owner
        .spec
        .domain_name
        .as_deref()
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DOMAIN_NAME);
    format!("{}-{}.{}", component, namespace, domain)
}

pub fn ingress(owner: &AppService, component: &str) -> Result<ManagedResource, ControllerError> {
    let annotations = BTreeMap::from([(REWRITE_TARGET_ANNOTATION.to_string(), "/$1".to_string())]);
    build(
        ResourceKind::Ingress,
        object_meta(owner, component, &component_labels(component), Some(annotations))?,
        json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "spec": {
                "rules": [{
                    "host": ingress_host(owner, component),
                    "http": {
                        "paths": [{
                            "path": INGRESS_PATH,
                            "pathType": "ImplementationSpecific",
                            "backend": {
                                "service": {
                                    "name": component,
                                    "port": { "number": HTTP_PORT }
                                }
                            }
                        }]
                    }
                }]
            }
        }),
    )
}
