//! Cluster data models
//!
//! `ManagedResource` is the tagged union of every object kind the controller
//! creates on behalf of an `AppService`.

use crate::error::ClusterError;
use crds::Route;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of objects managed on behalf of an `AppService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Secret,
    ConfigMap,
    PersistentVolumeClaim,
    Deployment,
    Service,
    Route,
    Ingress,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Secret => "Secret",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Route => "Route",
            ResourceKind::Ingress => "Ingress",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependent object owned by an `AppService`.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedResource {
    Secret(Secret),
    ConfigMap(ConfigMap),
    PersistentVolumeClaim(PersistentVolumeClaim),
    Deployment(Deployment),
    Service(Service),
    Route(Route),
    Ingress(Ingress),
}

impl ManagedResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedResource::Secret(_) => ResourceKind::Secret,
            ManagedResource::ConfigMap(_) => ResourceKind::ConfigMap,
            ManagedResource::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
            ManagedResource::Deployment(_) => ResourceKind::Deployment,
            ManagedResource::Service(_) => ResourceKind::Service,
            ManagedResource::Route(_) => ResourceKind::Route,
            ManagedResource::Ingress(_) => ResourceKind::Ingress,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ManagedResource::Secret(r) => &r.metadata,
            ManagedResource::ConfigMap(r) => &r.metadata,
            ManagedResource::PersistentVolumeClaim(r) => &r.metadata,
            ManagedResource::Deployment(r) => &r.metadata,
            ManagedResource::Service(r) => &r.metadata,
            ManagedResource::Route(r) => &r.metadata,
            ManagedResource::Ingress(r) => &r.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    /// `Kind namespace/name`, used in logs and error messages.
    pub fn describe(&self) -> String {
        format!("{} {}/{}", self.kind(), self.namespace(), self.name())
    }

    /// JSON form of the wrapped object.
    pub fn to_value(&self) -> Result<serde_json::Value, ClusterError> {
        let value = match self {
            ManagedResource::Secret(r) => serde_json::to_value(r)?,
            ManagedResource::ConfigMap(r) => serde_json::to_value(r)?,
            ManagedResource::PersistentVolumeClaim(r) => serde_json::to_value(r)?,
            ManagedResource::Deployment(r) => serde_json::to_value(r)?,
            ManagedResource::Service(r) => serde_json::to_value(r)?,
            ManagedResource::Route(r) => serde_json::to_value(r)?,
            ManagedResource::Ingress(r) => serde_json::to_value(r)?,
        };
        Ok(value)
    }

    /// Rebuilds a typed object of `kind` from its JSON form.
    pub fn from_value(kind: ResourceKind, value: serde_json::Value) -> Result<Self, ClusterError> {
        let resource = match kind {
            ResourceKind::Secret => ManagedResource::Secret(serde_json::from_value(value)?),
            ResourceKind::ConfigMap => ManagedResource::ConfigMap(serde_json::from_value(value)?),
            ResourceKind::PersistentVolumeClaim => {
                ManagedResource::PersistentVolumeClaim(serde_json::from_value(value)?)
            }
            ResourceKind::Deployment => ManagedResource::Deployment(serde_json::from_value(value)?),
            ResourceKind::Service => ManagedResource::Service(serde_json::from_value(value)?),
            ResourceKind::Route => ManagedResource::Route(serde_json::from_value(value)?),
            ResourceKind::Ingress => ManagedResource::Ingress(serde_json::from_value(value)?),
        };
        Ok(resource)
    }
}

/// Captured output of a command run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Event severity, mirrors the Kubernetes `Normal`/`Warning` types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// An observability event attached to an `AppService`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEvent {
    pub kind: EventKind,
    /// Short machine-readable reason, e.g. `Secret Created`
    pub reason: String,
    /// What the controller was doing, e.g. `Reconciling`
    pub action: String,
    pub message: String,
}

impl ClusterEvent {
    pub fn normal(reason: impl Into<String>, action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reason.into(),
            action: action.into(),
            message: message.into(),
        }
    }

    pub fn warning(reason: impl Into<String>, action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reason.into(),
            action: action.into(),
            message: message.into(),
        }
    }
}
