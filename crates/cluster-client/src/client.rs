//! kube-rs backed cluster client
//!
//! Every call builds a namespaced `Api` on the shared `kube::Client`; the
//! client itself is cheap to clone and holds no per-object state.

use crate::error::ClusterError;
use crate::models::{ClusterEvent, EventKind, ExecOutput, ManagedResource, ResourceKind};
use crate::cluster_trait::ClusterClientTrait;
use crds::{AppService, Route};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{AttachParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Cluster client talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    recorder: Recorder,
}

impl KubeClusterClient {
    /// Create a new client publishing events as `controller` (optionally `instance`)
    pub fn new(client: Client, controller: impl Into<String>, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller.into(),
            instance,
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
        }
    }

    async fn create_typed<K>(&self, namespace: &str, object: &K, what: &str) -> Result<(), ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), object)
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, what))
    }

    async fn get_typed<K>(&self, namespace: &str, name: &str, what: &str) -> Result<K, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + Debug + DeserializeOwned,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await.map_err(|e| ClusterError::from_kube(e, what))
    }

    async fn patch_typed<K>(&self, namespace: &str, name: &str, patch: &serde_json::Value, what: &str) -> Result<(), ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + Debug + DeserializeOwned,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, what))
    }

    fn app_services(&self, app: &AppService) -> Api<AppService> {
        Api::namespaced(self.client.clone(), &app.namespace().unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_app_service(&self, namespace: &str, name: &str) -> Result<AppService, ClusterError> {
        self.get_typed(namespace, name, &format!("AppService {}/{}", namespace, name)).await
    }

    async fn replace_app_service(&self, app: &AppService) -> Result<AppService, ClusterError> {
        let name = app.name_any();
        self.app_services(app)
            .replace(&name, &PostParams::default(), app)
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("AppService {}", name)))
    }

    async fn update_app_service_status(&self, app: &AppService) -> Result<AppService, ClusterError> {
        let name = app.name_any();
        // resourceVersion in a merge patch acts as a precondition
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": app.resource_version() },
            "status": app.status,
        });
        self.app_services(app)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("AppService {} status", name)))
    }

    async fn create_resource(&self, resource: &ManagedResource) -> Result<(), ClusterError> {
        let namespace = resource.namespace();
        let what = resource.describe();
        debug!("Creating {}", what);
        match resource {
            ManagedResource::Secret(r) => self.create_typed(namespace, r, &what).await,
            ManagedResource::ConfigMap(r) => self.create_typed(namespace, r, &what).await,
            ManagedResource::PersistentVolumeClaim(r) => self.create_typed(namespace, r, &what).await,
            ManagedResource::Deployment(r) => self.create_typed(namespace, r, &what).await,
            ManagedResource::Service(r) => self.create_typed(namespace, r, &what).await,
            ManagedResource::Route(r) => self.create_typed(namespace, r, &what).await,
            ManagedResource::Ingress(r) => self.create_typed(namespace, r, &what).await,
        }
    }

    async fn get_resource(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ManagedResource, ClusterError> {
        let what = format!("{} {}/{}", kind, namespace, name);
        let resource = match kind {
            ResourceKind::Secret => ManagedResource::Secret(self.get_typed::<Secret>(namespace, name, &what).await?),
            ResourceKind::ConfigMap => ManagedResource::ConfigMap(self.get_typed::<ConfigMap>(namespace, name, &what).await?),
            ResourceKind::PersistentVolumeClaim => {
                ManagedResource::PersistentVolumeClaim(self.get_typed::<PersistentVolumeClaim>(namespace, name, &what).await?)
            }
            ResourceKind::Deployment => ManagedResource::Deployment(self.get_typed::<Deployment>(namespace, name, &what).await?),
            ResourceKind::Service => ManagedResource::Service(self.get_typed::<Service>(namespace, name, &what).await?),
            ResourceKind::Route => ManagedResource::Route(self.get_typed::<Route>(namespace, name, &what).await?),
            ResourceKind::Ingress => ManagedResource::Ingress(self.get_typed::<Ingress>(namespace, name, &what).await?),
        };
        Ok(resource)
    }

    async fn patch_resource(&self, kind: ResourceKind, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<(), ClusterError> {
        let what = format!("{} {}/{}", kind, namespace, name);
        match kind {
            ResourceKind::Secret => self.patch_typed::<Secret>(namespace, name, patch, &what).await,
            ResourceKind::ConfigMap => self.patch_typed::<ConfigMap>(namespace, name, patch, &what).await,
            ResourceKind::PersistentVolumeClaim => self.patch_typed::<PersistentVolumeClaim>(namespace, name, patch, &what).await,
            ResourceKind::Deployment => self.patch_typed::<Deployment>(namespace, name, patch, &what).await,
            ResourceKind::Service => self.patch_typed::<Service>(namespace, name, patch, &what).await,
            ResourceKind::Route => self.patch_typed::<Route>(namespace, name, patch, &what).await,
            ResourceKind::Ingress => self.patch_typed::<Ingress>(namespace, name, patch, &what).await,
        }
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("Pods {} [{}]", namespace, label_selector)))?;
        Ok(list.items)
    }

    async fn exec_in_pod(&self, namespace: &str, pod: &str, container: &str, command: &[String]) -> Result<ExecOutput, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut process = pods
            .exec(pod, command.to_vec(), &params)
            .await
            .map_err(|e| ClusterError::Exec(format!("exec in {}/{} failed: {}", namespace, pod, e)))?;

        let mut stdout_reader = process
            .stdout()
            .ok_or_else(|| ClusterError::Exec("stdout stream not attached".to_string()))?;
        let mut stderr_reader = process
            .stderr()
            .ok_or_else(|| ClusterError::Exec("stderr stream not attached".to_string()))?;

        let mut output = ExecOutput::default();
        tokio::try_join!(
            stdout_reader.read_to_string(&mut output.stdout),
            stderr_reader.read_to_string(&mut output.stderr),
        )
        .map_err(|e| ClusterError::Exec(format!("reading output from {}/{} failed: {}", namespace, pod, e)))?;

        process
            .join()
            .await
            .map_err(|e| ClusterError::Exec(format!("exec session in {}/{} failed: {}", namespace, pod, e)))?;

        Ok(output)
    }

    async fn publish_event(&self, app: &AppService, event: &ClusterEvent) -> Result<(), ClusterError> {
        let ev = Event {
            type_: match event.kind {
                EventKind::Normal => EventType::Normal,
                EventKind::Warning => EventType::Warning,
            },
            reason: event.reason.clone(),
            note: Some(event.message.clone()),
            action: event.action.clone(),
            secondary: None,
        };
        let reference = app.object_ref(&());
        if let Err(e) = self.recorder.publish(&ev, &reference).await {
            warn!("Failed to publish event {} for {}: {}", event.reason, app.name_any(), e);
            return Err(ClusterError::from_kube(e, &format!("Event for AppService {}", app.name_any())));
        }
        Ok(())
    }
}
