//! AppService CRD Definitions
//!
//! Kubernetes Custom Resource Definitions used by the AppService controller,
//! plus the typed OpenShift `Route` it creates on OpenShift clusters.

pub mod app_service;
pub mod route;

pub use app_service::*;
pub use route::*;
