//! Status/outcome management.
//!
//! Every pass ends here. The outcome is written to `status` guarded by the
//! `resourceVersion` the pass read, and turned into the requeue decision
//! handed back to the runtime.

use super::{PassOutcome, Reconciler};
use crate::backoff::{self, STATUS_WRITE_RETRY};
use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use cluster_client::ClusterEvent;
use crds::{
    ActionType, AppService, AppServiceCondition, AppServiceStatus, ConditionReason, ConditionStatus, ConditionType,
    ReconcileStatus,
};
use kube::ResourceExt;
use std::time::Duration;
use tracing::{error, info, warn};

const PROCESSING_ERROR: &str = "ProcessingError";
const UNABLE_TO_UPDATE_STATUS: &str = "Unable to update status";

/// Inserts or updates the condition of `type_`.
///
/// `lastTransitionTime` only moves when the condition status changes.
pub fn set_condition(
    status: &mut AppServiceStatus,
    type_: ConditionType,
    condition_status: ConditionStatus,
    reason: ConditionReason,
    message: impl Into<String>,
    now: DateTime<Utc>,
) {
    let message = message.into();
    match status.conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status != condition_status {
                existing.status = condition_status;
                existing.last_transition_time = Some(now);
            }
            existing.reason = Some(reason);
            existing.message = message;
        }
        None => status.conditions.push(AppServiceCondition {
            type_,
            status: condition_status,
            last_transition_time: Some(now),
            reason: Some(reason),
            message,
        }),
    }
}

impl Reconciler {
    /// Records a failed pass and schedules the retry with backoff.
    pub(crate) async fn manage_error(&self, mut app: AppService, issue: ControllerError) -> PassOutcome {
        let now = Utc::now();
        let reason = issue.to_string();
        if issue.is_validation() {
            warn!("AppService {}/{} is not valid: {}", namespace_of(&app), app.name_any(), reason);
        } else {
            error!("Reconciliation of AppService {}/{} failed: {}", namespace_of(&app), app.name_any(), reason);
        }
        self.publish(&app, ClusterEvent::warning(PROCESSING_ERROR, "Reconciling", reason.clone()))
            .await;

        let generation = app.metadata.generation;
        let status = app.status.get_or_insert_with(AppServiceStatus::default);
        let delay = backoff::retry_interval(&status.reconcile_status, now);
        status.reconcile_status = ReconcileStatus {
            status: Some(ConditionStatus::Failed),
            last_update: Some(now),
            reason: reason.clone(),
            retry_interval_seconds: Some(delay.as_secs()),
        };
        status.last_action = Some(ActionType::NoAction);
        status.observed_generation = generation;
        set_condition(status, ConditionType::Ready, ConditionStatus::False, ConditionReason::Failed, reason, now);

        match self.persist_status(&app).await {
            StatusWrite::Written => {
                info!("Retrying AppService {}/{} in {:?}", namespace_of(&app), app.name_any(), delay);
                PassOutcome {
                    requeue_after: Some(delay),
                    error: Some(issue),
                }
            }
            StatusWrite::Gone => PassOutcome::default(),
            StatusWrite::Failed => PassOutcome {
                requeue_after: Some(STATUS_WRITE_RETRY),
                error: Some(issue),
            },
        }
    }

    /// Records a successful pass. Requeues only for a positive `requeue_after`.
    pub(crate) async fn manage_success(
        &self,
        mut app: AppService,
        requeue_after: Option<Duration>,
        action: ActionType,
    ) -> PassOutcome {
        let now = Utc::now();
        let generation = app.metadata.generation;
        let status = app.status.get_or_insert_with(AppServiceStatus::default);
        status.reconcile_status = ReconcileStatus {
            status: Some(ConditionStatus::True),
            last_update: Some(now),
            reason: String::new(),
            retry_interval_seconds: None,
        };
        status.last_action = Some(action);
        status.observed_generation = generation;
        set_condition(
            status,
            ConditionType::Ready,
            ConditionStatus::True,
            ConditionReason::Succeeded,
            "All managed resources are in place",
            now,
        );

        match self.persist_status(&app).await {
            StatusWrite::Written => PassOutcome {
                requeue_after: requeue_after.filter(|d| !d.is_zero()),
                error: None,
            },
            StatusWrite::Gone => PassOutcome::default(),
            StatusWrite::Failed => PassOutcome {
                requeue_after: Some(STATUS_WRITE_RETRY),
                error: None,
            },
        }
    }

    async fn persist_status(&self, app: &AppService) -> StatusWrite {
        match self.client.update_app_service_status(app).await {
            Ok(_) => StatusWrite::Written,
            Err(e) if e.is_not_found() => {
                info!("AppService {}/{} is gone, dropping status", namespace_of(app), app.name_any());
                StatusWrite::Gone
            }
            Err(e) => {
                error!("{} of AppService {}/{}: {}", UNABLE_TO_UPDATE_STATUS, namespace_of(app), app.name_any(), e);
                self.publish(app, ClusterEvent::warning(PROCESSING_ERROR, "Reconciling", UNABLE_TO_UPDATE_STATUS))
                    .await;
                StatusWrite::Failed
            }
        }
    }

    /// Publishes an event, logging instead of failing the pass.
    pub(crate) async fn publish(&self, app: &AppService, event: ClusterEvent) {
        if let Err(e) = self.client.publish_event(app, &event).await {
            warn!("Failed to publish {} event for AppService {}: {}", event.reason, app.name_any(), e);
        }
    }
}

enum StatusWrite {
    Written,
    /// The AppService was deleted during the pass
    Gone,
    Failed,
}

pub(crate) fn namespace_of(app: &AppService) -> String {
    app.namespace().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_transition_time_moves_only_on_status_change() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single().expect("valid time");
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).single().expect("valid time");
        let t2 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 9, 0).single().expect("valid time");
        let mut status = AppServiceStatus::default();

        set_condition(&mut status, ConditionType::Ready, ConditionStatus::False, ConditionReason::Failed, "boom", t0);
        set_condition(&mut status, ConditionType::Ready, ConditionStatus::False, ConditionReason::Failed, "again", t1);
        let ready = status.condition(ConditionType::Ready).expect("Ready condition");
        assert_eq!(ready.last_transition_time, Some(t0));
        assert_eq!(ready.message, "again");

        set_condition(&mut status, ConditionType::Ready, ConditionStatus::True, ConditionReason::Succeeded, "", t2);
        let ready = status.condition(ConditionType::Ready).expect("Ready condition");
        assert_eq!(ready.last_transition_time, Some(t2));
        assert_eq!(status.conditions.len(), 1);
    }
}
