//! Events database migration.
//!
//! Applies the update script once per AppService by running `psql` inside
//! a ready database pod. Every attempt is appended to
//! `status.eventsDatabaseScriptRuns`; once one has succeeded the runner is
//! never invoked again for that script.

use super::outcome::set_condition;
use super::Reconciler;
use crate::descriptors::database::{DATABASE_COMPONENT, DATABASE_CONTAINER, SCRIPTS_MOUNT_PATH};
use crate::error::ControllerError;
use crate::metrics;
use chrono::Utc;
use cluster_client::{ClusterError, ClusterEvent, ExecOutput};
use crds::{
    AppService, AppServiceStatus, ConditionReason, ConditionStatus, ConditionType, DatabaseScriptRun,
    DatabaseUpdateStatus,
};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static ERROR_IN_OUTPUT: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(r"(?i)error"));

/// What a migration attempt amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The script ran cleanly in `pod`
    Applied { pod: String },
    /// No database pod is ready yet; try again later
    NotReady,
}

/// True when `pod` is running and its database container reports ready.
pub fn is_ready_database_pod(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    status.phase.as_deref() == Some("Running")
        && status
            .container_statuses
            .iter()
            .flatten()
            .any(|c| c.name == DATABASE_CONTAINER && c.ready)
}

/// Shell command applying `script` from the mounted scripts volume.
pub fn migration_command(script: &str) -> Vec<String> {
    vec![
        "/bin/bash".to_string(),
        "-c".to_string(),
        format!(
            "psql -U $POSTGRESQL_USER $POSTGRESQL_DATABASE -f {}/{}",
            SCRIPTS_MOUNT_PATH, script
        ),
    ]
}

/// Whether captured output signals a failed script.
///
/// Anything on stderr counts, as does the word "error" in any case on stdout.
pub fn output_indicates_failure(output: &ExecOutput) -> bool {
    if !output.stderr.trim().is_empty() {
        return true;
    }
    match &*ERROR_IN_OUTPUT {
        Ok(pattern) => pattern.is_match(&output.stdout),
        Err(_) => output.stdout.to_lowercase().contains("error"),
    }
}

fn record_run(status: &mut AppServiceStatus, script: &str, result: DatabaseUpdateStatus) {
    status.events_database_script_runs.push(DatabaseScriptRun {
        script_name: script.to_string(),
        status: result,
    });
    status.events_database_updated = Some(result);
}

impl Reconciler {
    /// Runs the update script unless it already succeeded.
    ///
    /// The attempt is recorded on `app.status` in both outcomes; the caller
    /// persists it with the rest of the pass result.
    pub(crate) async fn run_migration(&self, app: &mut AppService) -> Result<MigrationOutcome, ControllerError> {
        let namespace = app.namespace().unwrap_or_default();
        let script = self.scripts.update_script().to_string();

        let pods = self
            .client
            .list_pods(&namespace, &format!("component={}", DATABASE_COMPONENT))
            .await?;
        let Some(pod) = pods.iter().find(|p| is_ready_database_pod(p)) else {
            debug!("No ready {} pod in {} yet ({} listed)", DATABASE_COMPONENT, namespace, pods.len());
            let status = app.status.get_or_insert_with(AppServiceStatus::default);
            set_condition(
                status,
                ConditionType::DatabaseUpdated,
                ConditionStatus::Unknown,
                ConditionReason::Waiting,
                format!("Waiting for a ready {} pod", DATABASE_COMPONENT),
                Utc::now(),
            );
            return Ok(MigrationOutcome::NotReady);
        };
        let pod_name = pod.name_any();

        info!("Running {} in pod {}/{}", script, namespace, pod_name);
        let command = migration_command(&script);
        let exec = self
            .client
            .exec_in_pod(&namespace, &pod_name, DATABASE_CONTAINER, &command);
        let result = match tokio::time::timeout(self.exec_timeout, exec).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ClusterError::Exec(format!(
                "{} in {}/{} did not finish within {}s",
                script,
                namespace,
                pod_name,
                self.exec_timeout.as_secs_f64()
            ))),
        };

        let failure = match result {
            Ok(output) if !output_indicates_failure(&output) => {
                debug!("{} output: {}", script, output.stdout);
                None
            }
            Ok(output) => {
                let text = if output.stderr.trim().is_empty() { output.stdout } else { output.stderr };
                Some(ControllerError::MigrationRejected {
                    script: script.clone(),
                    pod: pod_name.clone(),
                    output: text.trim().to_string(),
                })
            }
            Err(e) => Some(ControllerError::RemoteExecution(e.to_string())),
        };

        let now = Utc::now();
        let status = app.status.get_or_insert_with(AppServiceStatus::default);
        match failure {
            None => {
                record_run(status, &script, DatabaseUpdateStatus::Succeeded);
                set_condition(
                    status,
                    ConditionType::DatabaseUpdated,
                    ConditionStatus::True,
                    ConditionReason::Succeeded,
                    format!("Applied {}", script),
                    now,
                );
                metrics::increment_migration_runs("succeeded");
                info!("Database script {} applied in {}/{}", script, namespace, pod_name);
                self.publish(
                    app,
                    ClusterEvent::normal(
                        "Database Updated",
                        "Migrating",
                        format!("Applied {} in pod {}", script, pod_name),
                    ),
                )
                .await;
                Ok(MigrationOutcome::Applied { pod: pod_name })
            }
            Some(err) => {
                record_run(status, &script, DatabaseUpdateStatus::Failed);
                set_condition(
                    status,
                    ConditionType::DatabaseUpdated,
                    ConditionStatus::False,
                    ConditionReason::Failed,
                    err.to_string(),
                    now,
                );
                metrics::increment_migration_runs("failed");
                warn!("Database script {} failed in {}/{}: {}", script, namespace, pod_name, err);
                self.publish(
                    app,
                    ClusterEvent::warning("Database Update Failed", "Migrating", err.to_string()),
                )
                .await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_pod;

    #[test]
    fn test_only_running_pods_with_ready_container_qualify() {
        assert!(is_ready_database_pod(&create_test_pod("events-database-1", "demo", "Running", true)));
        assert!(!is_ready_database_pod(&create_test_pod("events-database-1", "demo", "Running", false)));
        assert!(!is_ready_database_pod(&create_test_pod("events-database-1", "demo", "Pending", true)));
    }

    #[test]
    fn test_failure_classification() {
        let clean = ExecOutput { stdout: "ALTER TABLE\n".to_string(), stderr: String::new() };
        assert!(!output_indicates_failure(&clean));

        let stdout_error = ExecOutput { stdout: "psql: ERROR: relation missing".to_string(), stderr: String::new() };
        assert!(output_indicates_failure(&stdout_error));

        let stderr_only = ExecOutput { stdout: String::new(), stderr: "NOTICE: something".to_string() };
        assert!(output_indicates_failure(&stderr_only));
    }

    #[test]
    fn test_command_targets_mounted_script() {
        let command = migration_command("events-database-update-0.0.2.sql");
        assert_eq!(command[0], "/bin/bash");
        assert_eq!(
            command[2],
            "psql -U $POSTGRESQL_USER $POSTGRESQL_DATABASE -f /operator/scripts/events-database-update-0.0.2.sql"
        );
    }
}
