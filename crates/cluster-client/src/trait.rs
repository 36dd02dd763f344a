//! ClusterClient trait for mocking
//!
//! This trait abstracts every cluster interaction of the AppService
//! controller so reconcilers can be unit-tested against an in-memory store.
//! `KubeClusterClient` implements it on top of kube-rs.

use crate::error::ClusterError;
use crate::models::{ClusterEvent, ExecOutput, ManagedResource, ResourceKind};
use crds::AppService;
use k8s_openapi::api::core::v1::Pod;

/// Trait for cluster operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // AppService operations
    async fn get_app_service(&self, namespace: &str, name: &str) -> Result<AppService, ClusterError>;

    /// Replaces the whole object. Fails with `Conflict` when `resourceVersion` is stale.
    async fn replace_app_service(&self, app: &AppService) -> Result<AppService, ClusterError>;

    /// Writes `app.status`. Fails with `Conflict` when `resourceVersion` is stale.
    async fn update_app_service_status(&self, app: &AppService) -> Result<AppService, ClusterError>;

    // Managed resource operations
    /// Creates the object, `AlreadyExists` when the name is taken.
    async fn create_resource(&self, resource: &ManagedResource) -> Result<(), ClusterError>;
    async fn get_resource(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ManagedResource, ClusterError>;
    /// Applies an RFC 7386 JSON merge patch.
    async fn patch_resource(&self, kind: ResourceKind, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<(), ClusterError>;

    // Pod operations
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, ClusterError>;
    async fn exec_in_pod(&self, namespace: &str, pod: &str, container: &str, command: &[String]) -> Result<ExecOutput, ClusterError>;

    // Events
    async fn publish_event(&self, app: &AppService, event: &ClusterEvent) -> Result<(), ClusterError>;
}
