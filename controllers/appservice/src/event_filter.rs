//! Watch event filtering.
//!
//! Decides which changes to an `AppService` or to a database pod are worth
//! a reconciliation pass. The kube watcher only reports the latest state of
//! an object, so `EventFilter` remembers the last version it saw of each
//! one and rebuilds the create/update/delete transition from that.

use crate::descriptors::database::DATABASE_COMPONENT;
use crds::AppService;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// An object delivered by one of the watches.
#[derive(Debug, Clone, Copy)]
pub enum WatchedObject<'a> {
    AppService(&'a AppService),
    /// A pod of the managed application stack
    ProcessInstance(&'a Pod),
}

/// A change to a watched object.
#[derive(Debug, Clone, Copy)]
pub enum WatchEvent<'a> {
    Create(WatchedObject<'a>),
    Update {
        old: WatchedObject<'a>,
        new: WatchedObject<'a>,
    },
    Delete(WatchedObject<'a>),
}

/// True when `event` should trigger a reconciliation pass.
///
/// AppService updates only count when the spec generation moved and the
/// resource is enabled, so the controller's own status writes never loop
/// back. Pods only matter once a database pod reaches a running phase.
pub fn admits(event: &WatchEvent<'_>) -> bool {
    match event {
        WatchEvent::Create(WatchedObject::AppService(_)) => true,
        WatchEvent::Update {
            old: WatchedObject::AppService(old),
            new: WatchedObject::AppService(new),
        } => new.spec.enabled && new.metadata.generation != old.metadata.generation,
        WatchEvent::Update {
            new: WatchedObject::ProcessInstance(pod),
            ..
        } => is_running_database_pod(pod),
        WatchEvent::Update { .. } => false,
        WatchEvent::Delete(_) => false,
        WatchEvent::Create(WatchedObject::ProcessInstance(_)) => false,
    }
}

fn is_running_database_pod(pod: &Pod) -> bool {
    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
    pod.name_any().contains(DATABASE_COMPONENT) && matches!(phase, Some("Running") | Some("Succeeded"))
}

fn cache_key<K: ResourceExt>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Stateful adapter between the watch streams and [`admits`].
#[derive(Default)]
pub struct EventFilter {
    app_services: Mutex<HashMap<String, Arc<AppService>>>,
    pods: Mutex<HashMap<String, Arc<Pod>>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an applied AppService and reports whether it is admitted.
    pub fn observe_app_service(&self, app: &AppService) -> bool {
        let key = cache_key(app);
        let previous = self
            .app_services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Arc::new(app.clone()));

        let admitted = match previous.as_deref() {
            None => admits(&WatchEvent::Create(WatchedObject::AppService(app))),
            Some(old) => admits(&WatchEvent::Update {
                old: WatchedObject::AppService(old),
                new: WatchedObject::AppService(app),
            }),
        };
        debug!("AppService {} event admitted: {}", key, admitted);
        admitted
    }

    /// Records a deleted AppService.
    pub fn forget_app_service(&self, app: &AppService) -> bool {
        self.app_services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&cache_key(app));
        admits(&WatchEvent::Delete(WatchedObject::AppService(app)))
    }

    /// Records an applied pod and reports whether it is admitted.
    ///
    /// A pod carrying a deletion timestamp is handled as a delete.
    pub fn observe_process_instance(&self, pod: &Pod) -> bool {
        if pod.metadata.deletion_timestamp.is_some() {
            return self.forget_process_instance(pod);
        }
        let key = cache_key(pod);
        let previous = self
            .pods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Arc::new(pod.clone()));

        let admitted = match previous.as_deref() {
            None => admits(&WatchEvent::Create(WatchedObject::ProcessInstance(pod))),
            Some(old) => admits(&WatchEvent::Update {
                old: WatchedObject::ProcessInstance(old),
                new: WatchedObject::ProcessInstance(pod),
            }),
        };
        debug!("Pod {} event admitted: {}", key, admitted);
        admitted
    }

    /// Records a deleted pod.
    pub fn forget_process_instance(&self, pod: &Pod) -> bool {
        self.pods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&cache_key(pod));
        admits(&WatchEvent::Delete(WatchedObject::ProcessInstance(pod)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app_service, create_test_pod};

    #[test]
    fn test_first_sight_of_app_service_is_admitted() {
        let filter = EventFilter::new();
        assert!(filter.observe_app_service(&create_test_app_service("gramola", "demo")));
    }

    #[test]
    fn test_status_only_update_is_not_admitted() {
        let filter = EventFilter::new();
        let mut app = create_test_app_service("gramola", "demo");
        filter.observe_app_service(&app);

        app.status = Some(Default::default());
        app.metadata.resource_version = Some("7".to_string());
        assert!(!filter.observe_app_service(&app));
    }

    #[test]
    fn test_spec_change_is_admitted_only_when_enabled() {
        let filter = EventFilter::new();
        let mut app = create_test_app_service("gramola", "demo");
        filter.observe_app_service(&app);

        app.metadata.generation = Some(2);
        assert!(filter.observe_app_service(&app));

        app.spec.enabled = false;
        app.metadata.generation = Some(3);
        assert!(!filter.observe_app_service(&app));
    }

    #[test]
    fn test_app_service_delete_is_not_admitted() {
        let filter = EventFilter::new();
        let app = create_test_app_service("gramola", "demo");
        filter.observe_app_service(&app);
        assert!(!filter.forget_app_service(&app));
        // seen again after deletion counts as a create
        assert!(filter.observe_app_service(&app));
    }

    #[test]
    fn test_database_pod_becoming_running_is_admitted() {
        let filter = EventFilter::new();
        let pending = create_test_pod("events-database-1-abcde", "demo", "Pending", false);
        assert!(!filter.observe_process_instance(&pending));

        let running = create_test_pod("events-database-1-abcde", "demo", "Running", true);
        assert!(filter.observe_process_instance(&running));
    }

    #[test]
    fn test_first_sight_of_running_database_pod_is_not_admitted() {
        let filter = EventFilter::new();
        let running = create_test_pod("events-database-1-abcde", "demo", "Running", true);
        assert!(!filter.observe_process_instance(&running));

        // a later update of the same pod is
        assert!(filter.observe_process_instance(&running));
    }

    #[test]
    fn test_other_pods_are_ignored() {
        let filter = EventFilter::new();
        let pod = create_test_pod("gateway-7d9f-xyz", "demo", "Pending", false);
        filter.observe_process_instance(&pod);

        let running = create_test_pod("gateway-7d9f-xyz", "demo", "Running", true);
        assert!(!filter.observe_process_instance(&running));
    }

    #[test]
    fn test_terminating_pod_is_a_delete() {
        let filter = EventFilter::new();
        let pod = create_test_pod("events-database-1-abcde", "demo", "Running", true);
        filter.observe_process_instance(&pod);

        let mut terminating = pod.clone();
        terminating.metadata.deletion_timestamp =
            Some(serde_json::from_value(serde_json::json!("2025-01-01T00:00:00Z")).expect("valid timestamp"));
        assert!(!filter.observe_process_instance(&terminating));
    }
}
