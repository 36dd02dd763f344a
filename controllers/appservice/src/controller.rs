//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the reconciler and the watcher together, and runs them next to
//! the metrics and probe server.

use crate::config::{ControllerConfig, DatabaseScripts, CONTROLLER_NAME};
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::server::{start_server, ServerState};
use crate::watcher::Watcher;
use cluster_client::{ClusterError, KubeClusterClient};
use crds::AppService;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Main controller for AppService resources.
pub struct Controller {
    app_service_watcher: JoinHandle<Result<(), ControllerError>>,
    http_server: JoinHandle<Result<(), anyhow::Error>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig, scripts: DatabaseScripts) -> Result<Self, ControllerError> {
        info!("Initializing AppService Controller");

        let kube_client = Client::try_default()
            .await
            .map_err(|e| ControllerError::Cluster(ClusterError::Kube(e)))?;

        let (app_service_api, pod_api): (Api<AppService>, Api<Pod>) = match config.namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client.clone(), ns),
            ),
            None => (Api::all(kube_client.clone()), Api::all(kube_client.clone())),
        };

        let cluster_client = KubeClusterClient::new(kube_client, CONTROLLER_NAME, config.instance.clone());
        let reconciler = Arc::new(
            Reconciler::new(Box::new(cluster_client), Arc::new(scripts)).with_exec_timeout(config.exec_timeout),
        );
        let watcher_instance = Watcher::new(reconciler, app_service_api, pod_api, config.concurrency);

        let is_ready = Arc::new(AtomicBool::new(false));
        let http_server = {
            let state = Arc::new(ServerState {
                is_ready: is_ready.clone(),
            });
            let port = config.metrics_port;
            tokio::spawn(async move { start_server(port, state).await })
        };

        let app_service_watcher = tokio::spawn(async move { watcher_instance.watch_app_services().await });
        is_ready.store(true, Ordering::Relaxed);

        info!("AppService Controller initialized");
        Ok(Self {
            app_service_watcher,
            http_server,
        })
    }

    /// Runs until the watcher or the HTTP server stops.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("AppService Controller running");

        tokio::select! {
            result = &mut self.app_service_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("AppService watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("AppService watcher error: {}", e)))?;
            }
            result = &mut self.http_server => {
                let err = match result {
                    Ok(Ok(())) => "HTTP server stopped".to_string(),
                    Ok(Err(e)) => format!("HTTP server error: {}", e),
                    Err(e) => format!("HTTP server panicked: {}", e),
                };
                error!("{}", err);
                return Err(ControllerError::Watch(err));
            }
        }

        Ok(())
    }
}
