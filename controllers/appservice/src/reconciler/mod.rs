//! Reconciliation logic for AppService resources.
//!
//! A pass runs to completion against a fresh copy of the AppService:
//! validation, one-time initialization, the three resource phases, the
//! database migration and finally the status write. The outcome tells the
//! runtime when to run the next pass; the reconciler keeps no timers.
//!
//! - `validation`: spec checks
//! - `initialization`: spec defaults
//! - `phases`: managed resources per application tier
//! - `migration`: events database script
//! - `outcome`: status persistence and retry scheduling

pub mod initialization;
pub mod migration;
pub mod outcome;
pub mod phases;
pub mod validation;


use crate::backoff::STATUS_WRITE_RETRY;
use crate::config::{DatabaseScripts, DEFAULT_EXEC_TIMEOUT};
use crate::error::ControllerError;
use crate::event_filter::WatchedObject;
use cluster_client::{ClusterClientTrait, ClusterEvent};
use crds::ActionType;
use initialization::Initialization;
use migration::MigrationOutcome;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Delay before looking for a ready database pod again
pub const DATABASE_NOT_READY_REQUEUE: Duration = Duration::from_secs(10);

/// Result of a single reconciliation pass.
#[derive(Debug, Default)]
pub struct PassOutcome {
    /// When to run the next pass; `None` waits for the next admitted change
    pub requeue_after: Option<Duration>,
    /// The error the pass ended with, already recorded in status
    pub error: Option<ControllerError>,
}

/// Reconciles AppService resources.
pub struct Reconciler {
    pub(crate) client: Box<dyn ClusterClientTrait>,
    pub(crate) scripts: Arc<DatabaseScripts>,
    pub(crate) exec_timeout: Duration,
}

impl Reconciler {
    pub fn new(client: Box<dyn ClusterClientTrait>, scripts: Arc<DatabaseScripts>) -> Self {
        Self {
            client,
            scripts,
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }

    /// Bounds every remote migration run by `timeout`.
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// Runs one pass for the AppService `namespace/name`.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> PassOutcome {
        info!("Reconciling AppService {}/{}", namespace, name);

        let mut app = match self.client.get_app_service(namespace, name).await {
            Ok(app) => app,
            Err(e) if e.is_not_found() => {
                debug!("AppService {}/{} no longer exists", namespace, name);
                return PassOutcome::default();
            }
            Err(e) => {
                error!("Failed to read AppService {}/{}: {}", namespace, name, e);
                return PassOutcome {
                    requeue_after: Some(STATUS_WRITE_RETRY),
                    error: Some(e.into()),
                };
            }
        };

        if let Err(e) = validation::validate(WatchedObject::AppService(&app)).map(|_| ()) {
            return self.manage_error(app, e).await;
        }

        if initialization::initialize(&mut app) == Initialization::JustInitialized {
            return match self.client.replace_app_service(&app).await {
                Ok(updated) => {
                    info!("Initialized AppService {}/{}", namespace, name);
                    self.publish(
                        &updated,
                        ClusterEvent::normal("Initialized", "Initializing", format!("Initialized {} AppService", name)),
                    )
                    .await;
                    PassOutcome {
                        requeue_after: Some(Duration::ZERO),
                        error: None,
                    }
                }
                Err(e) if e.is_not_found() => PassOutcome::default(),
                Err(e) => self.manage_error(app, e.into()).await,
            };
        }

        if let Err(e) = self.run_phases(&app).await {
            return self.manage_error(app, e).await;
        }

        let script_applied = app
            .status
            .as_ref()
            .is_some_and(|s| s.script_succeeded(self.scripts.update_script()));
        if !script_applied {
            match self.run_migration(&mut app).await {
                Ok(MigrationOutcome::Applied { pod }) => debug!("Events database of {}/{} migrated in {}", namespace, name, pod),
                Ok(MigrationOutcome::NotReady) => {
                    return self
                        .manage_success(app, Some(DATABASE_NOT_READY_REQUEUE), ActionType::RequeueEvent)
                        .await;
                }
                Err(e) => return self.manage_error(app, e).await,
            }
        }

        self.manage_success(app, None, ActionType::NoAction).await
    }
}
