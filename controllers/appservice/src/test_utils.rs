//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::config::DatabaseScripts;
#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use cluster_client::MockClusterClient;
#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodStatus};
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::Arc;

/// Helper to create a test AppService with a namespace and uid
#[cfg(test)]
pub fn create_test_app_service(name: &str, namespace: &str) -> AppService {
    AppService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{}-{}", namespace, name)),
            generation: Some(1),
            ..Default::default()
        },
        spec: AppServiceSpec {
            enabled: true,
            alias: Some("Gramola".to_string()),
            ..Default::default()
        },
        status: None,
    }
}

/// Helper to create a test AppService that has already been defaulted
#[cfg(test)]
pub fn create_initialized_app_service(name: &str, namespace: &str, platform: &str) -> AppService {
    let mut app = create_test_app_service(name, namespace);
    app.spec.initialized = true;
    app.spec.platform = Some(platform.to_string());
    app.spec.domain_name = Some(DEFAULT_DOMAIN_NAME.to_string());
    app
}

/// Helper to create a database pod in `phase`, with its `postgresql`
/// container reporting `ready`
#[cfg(test)]
pub fn create_test_pod(name: &str, namespace: &str, phase: &str, ready: bool) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([
                ("app".to_string(), "gramola".to_string()),
                ("component".to_string(), "events-database".to_string()),
            ])),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            container_statuses: Some(vec![ContainerStatus {
                name: "postgresql".to_string(),
                ready,
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Scripts bundle holding a single update script
#[cfg(test)]
pub fn create_test_scripts() -> DatabaseScripts {
    DatabaseScripts::from_contents(BTreeMap::from([(
        DatabaseScripts::UPDATE_SCRIPT.to_string(),
        "ALTER TABLE events ADD COLUMN image TEXT;".to_string(),
    )]))
}

/// Helper to create a reconciler backed by `client`
#[cfg(test)]
pub fn create_test_reconciler(client: MockClusterClient) -> Reconciler {
    Reconciler::new(Box::new(client), Arc::new(create_test_scripts()))
}
