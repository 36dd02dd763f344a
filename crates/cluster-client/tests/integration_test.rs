//! Integration tests for the cluster client
//!
//! These tests require a reachable Kubernetes cluster (current kubeconfig
//! context) with the AppService CRD installed.

use cluster_client::{ClusterClientTrait, ClusterError, KubeClusterClient};

async fn client() -> KubeClusterClient {
    let kube_client = kube::Client::try_default()
        .await
        .expect("Failed to create Kubernetes client");
    KubeClusterClient::new(kube_client, "appservice-controller-tests", None)
}

#[tokio::test]
#[ignore] // Requires running cluster
async fn test_list_pods_in_default_namespace() {
    let pods = client().await.list_pods("default", "app=gramola").await;
    assert!(pods.is_ok(), "Failed to list pods");
}

#[tokio::test]
#[ignore] // Requires running cluster
async fn test_missing_app_service_is_not_found() {
    let result = client().await.get_app_service("default", "does-not-exist").await;
    assert!(matches!(result, Err(ClusterError::NotFound(_))));
}
