//! Kubernetes resource watchers.
//!
//! One `kube_runtime::Controller` drives every AppService. Its trigger
//! streams go through the `EventFilter` first: AppServices on creation and
//! spec changes, and database pods of the managed stack once they reach a
//! running phase, which re-enqueues every AppService in the pod's namespace.

use crate::error::ControllerError;
use crate::event_filter::EventFilter;
use crate::metrics;
use crate::reconciler::Reconciler;
use crds::AppService;
use futures::future;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::reflector::{self, ObjectRef};
use kube_runtime::{watcher, Controller, WatchStreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Label every pod of the managed stack carries
const STACK_POD_SELECTOR: &str = "app=gramola";

/// Requeue used when the runtime reports a reconcile error.
const ERROR_POLICY_REQUEUE: Duration = Duration::from_secs(1);

/// Watches AppServices and their database pods.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    app_service_api: Api<AppService>,
    pod_api: Api<Pod>,
    concurrency: u16,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, app_service_api: Api<AppService>, pod_api: Api<Pod>, concurrency: u16) -> Self {
        Self {
            reconciler,
            app_service_api,
            pod_api,
            concurrency,
        }
    }

    /// Runs the controller until its trigger streams end.
    pub async fn watch_app_services(&self) -> Result<(), ControllerError> {
        info!("Starting AppService watcher");

        let filter = Arc::new(EventFilter::new());
        let (reader, writer) = reflector::store::<AppService>();

        let app_filter = filter.clone();
        let app_services = watcher(self.app_service_api.clone(), watcher::Config::default())
            .default_backoff()
            .reflect(writer)
            .try_filter_map(move |event| {
                let admitted = match event {
                    watcher::Event::Apply(app) | watcher::Event::InitApply(app) => {
                        app_filter.observe_app_service(&app).then_some(app)
                    }
                    watcher::Event::Delete(app) => {
                        app_filter.forget_app_service(&app);
                        None
                    }
                    watcher::Event::Init | watcher::Event::InitDone => None,
                };
                future::ready(Ok(admitted))
            });

        let pod_filter = filter.clone();
        let pods = watcher(self.pod_api.clone(), watcher::Config::default().labels(STACK_POD_SELECTOR))
            .default_backoff()
            .try_filter_map(move |event| {
                let admitted = match event {
                    watcher::Event::Apply(pod) | watcher::Event::InitApply(pod) => {
                        pod_filter.observe_process_instance(&pod).then_some(pod)
                    }
                    watcher::Event::Delete(pod) => {
                        pod_filter.forget_process_instance(&pod);
                        None
                    }
                    watcher::Event::Init | watcher::Event::InitDone => None,
                };
                future::ready(Ok(admitted))
            });

        let store = reader.clone();
        let owners_in_namespace = move |pod: Pod| {
            let namespace = pod.namespace();
            let owners: Vec<ObjectRef<AppService>> = store
                .state()
                .into_iter()
                .filter(|app| app.namespace() == namespace)
                .map(|app| ObjectRef::from_obj(&*app))
                .collect();
            debug!("Pod {} triggers {} AppService(s)", pod.name_any(), owners.len());
            owners
        };

        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(1))
            .concurrency(self.concurrency);

        Controller::for_stream(app_services, reader)
            .watches_stream(pods, owners_in_namespace)
            .with_config(controller_config)
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((object, action)) => debug!("Reconciled {}: {:?}", object, action),
                    Err(e) => error!("AppService controller error: {}", e),
                }
            })
            .await;

        Err(ControllerError::Watch("AppService watch stream ended".to_string()))
    }
}

async fn reconcile(app: Arc<AppService>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let started = Instant::now();
    metrics::increment_reconciliations();

    let outcome = reconciler
        .reconcile(&app.namespace().unwrap_or_default(), &app.name_any())
        .await;

    metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());
    if let Some(e) = &outcome.error {
        metrics::increment_reconciliation_errors();
        warn!("Pass for AppService {} ended with error: {}", app.name_any(), e);
    }

    Ok(match outcome.requeue_after {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

fn error_policy(app: Arc<AppService>, error: &ControllerError, _ctx: Arc<Reconciler>) -> Action {
    error!("Reconciliation error for AppService {}: {}", app.name_any(), error);
    Action::requeue(ERROR_POLICY_REQUEUE)
}
