//! AppService Controller
//!
//! Reconciles `AppService` resources into the gramola application stack:
//! - events service and its PostgreSQL database
//! - gateway
//! - frontend
//!
//! Public exposure is a Route on OpenShift and an Ingress elsewhere. The
//! events database schema is migrated in place once its pod is ready.

mod backoff;
mod config;
mod controller;
mod descriptors;
mod error;
mod event_filter;
mod metrics;
mod reconciler;
mod server;
mod sync;
mod test_utils;
mod watcher;

use crate::config::{ControllerConfig, DatabaseScripts};
use crate::descriptors::database::DATABASE_USER;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // rustls needs an explicit crypto provider when several are compiled in
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting AppService Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Scripts base dir: {}", config.scripts_base_dir.display());
    info!("  Metrics port: {}", config.metrics_port);
    info!("  Concurrency: {}", config.concurrency);

    let scripts = DatabaseScripts::load(&config.scripts_base_dir, DATABASE_USER).await;

    metrics::register_metrics()
        .map_err(|e| ControllerError::InvalidConfig(format!("Failed to register metrics: {}", e)))?;

    let controller = Controller::new(config, scripts).await?;
    controller.run().await?;

    Ok(())
}
