//! AppService CRD
//!
//! Declares the desired state of a gramola application stack: the events
//! service with its PostgreSQL database, the gateway and the frontend.
//! The controller owns the `status` subresource; users only write `spec`.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Domain name applied to Kubernetes platforms when none is given.
pub const DEFAULT_DOMAIN_NAME: &str = "minikube.local";

/// Pattern every `domainName` must match on Kubernetes platforms.
pub const DOMAIN_NAME_PATTERN: &str = r"^(?:[_a-z0-9](?:[_a-z0-9-]{0,61}[a-z0-9]\.)|(?:[0-9]+/[0-9]{2})\.)+(?:[a-z](?:[a-z0-9-]{0,61}[a-z0-9])?)?$";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "gramola.atarazana.com",
    version = "v1",
    kind = "AppService",
    namespaced,
    status = "AppServiceStatus",
    shortname = "appsvc",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Platform","type":"string","jsonPath":".spec.platform"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.reconcileStatus.status"}"#,
    printcolumn = r#"{"name":"Database","type":"string","jsonPath":".status.eventsDatabaseUpdated"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppServiceSpec {
    /// Whether spec changes should trigger reconciliation
    #[serde(default)]
    pub enabled: bool,

    /// Free-form location hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Set once by the controller after defaults have been applied
    #[serde(default)]
    pub initialized: bool,

    /// Application alias, one of `Gramola`, `Gramophone`, `Phonograph`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Target platform, `kubernetes` or `openshift`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Base domain used to build ingress hosts on Kubernetes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
}

impl AppServiceSpec {
    /// Parsed platform, `None` when unset or unknown.
    pub fn platform(&self) -> Option<Platform> {
        self.platform.as_deref().and_then(|p| p.parse().ok())
    }
}

/// Error returned when a string is not a known enum value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownValue {
    /// What was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

/// Platform the application stack is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Vanilla Kubernetes, exposed through Ingress
    Kubernetes,
    /// OpenShift, exposed through Routes
    OpenShift,
}

impl Platform {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Kubernetes => "kubernetes",
            Platform::OpenShift => "openshift",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kubernetes" => Ok(Platform::Kubernetes),
            "openshift" => Ok(Platform::OpenShift),
            other => Err(UnknownValue { kind: "platform", value: other.to_string() }),
        }
    }
}

/// Accepted application aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alias {
    Gramola,
    Gramophone,
    Phonograph,
}

impl FromStr for Alias {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Gramola" => Ok(Alias::Gramola),
            "Gramophone" => Ok(Alias::Gramophone),
            "Phonograph" => Ok(Alias::Phonograph),
            other => Err(UnknownValue { kind: "alias", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppServiceStatus {
    /// Outcome of the most recently completed reconciliation pass
    #[serde(default)]
    pub reconcile_status: ReconcileStatus,

    /// Whether the events database update script has been applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_database_updated: Option<DatabaseUpdateStatus>,

    /// Every attempt to apply a database script, append-only
    #[serde(default)]
    pub events_database_script_runs: Vec<DatabaseScriptRun>,

    /// Last action decided by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<ActionType>,

    #[serde(default)]
    pub conditions: Vec<AppServiceCondition>,

    /// Generation observed by the pass that last wrote this status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl AppServiceStatus {
    /// True when some run of `script` has already succeeded.
    pub fn script_succeeded(&self, script: &str) -> bool {
        self.events_database_script_runs
            .iter()
            .any(|run| run.script_name == script && run.status == DatabaseUpdateStatus::Succeeded)
    }

    /// Looks up a condition by type.
    pub fn condition(&self, type_: ConditionType) -> Option<&AppServiceCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConditionStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    #[serde(default)]
    pub reason: String,

    /// Delay scheduled after the last failed pass, in seconds
    ///
    /// Serialized as `null` when unset so a status merge patch clears it.
    #[serde(default)]
    pub retry_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Failed,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum DatabaseUpdateStatus {
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseScriptRun {
    pub script_name: String,
    pub status: DatabaseUpdateStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ActionType {
    BackupStarted,
    RequeueEvent,
    #[default]
    NoAction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    /// All managed resources are in place
    Ready,
    /// The events database update script has run
    DatabaseUpdated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionReason {
    Initialized,
    Waiting,
    Progressing,
    Finalising,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppServiceCondition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConditionReason>,

    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_spec_round_trips_camel_case() {
        let spec: AppServiceSpec = serde_json::from_value(serde_json::json!({
            "enabled": true,
            "alias": "Gramola",
            "platform": "kubernetes",
            "domainName": "apps.example.com"
        }))
        .expect("spec should deserialize");

        assert!(spec.enabled);
        assert!(!spec.initialized);
        assert_eq!(spec.domain_name.as_deref(), Some("apps.example.com"));
        assert_eq!(spec.platform(), Some(Platform::Kubernetes));
    }

    #[test]
    fn test_unknown_platform_parses_to_none() {
        let spec = AppServiceSpec {
            platform: Some("nomad".to_string()),
            ..Default::default()
        };
        assert_eq!(spec.platform(), None);
        assert_eq!(
            "nomad".parse::<Platform>(),
            Err(UnknownValue { kind: "platform", value: "nomad".to_string() })
        );
    }

    #[test]
    fn test_status_uses_pascal_case_values() {
        let status = AppServiceStatus {
            reconcile_status: ReconcileStatus {
                status: Some(ConditionStatus::Failed),
                ..Default::default()
            },
            events_database_updated: Some(DatabaseUpdateStatus::Succeeded),
            last_action: Some(ActionType::RequeueEvent),
            ..Default::default()
        };
        let value = serde_json::to_value(&status).expect("status should serialize");

        assert_eq!(value["reconcileStatus"]["status"], "Failed");
        assert_eq!(value["eventsDatabaseUpdated"], "Succeeded");
        assert_eq!(value["lastAction"], "RequeueEvent");
    }

    #[test]
    fn test_cleared_retry_interval_serializes_as_null() {
        let status = ReconcileStatus {
            status: Some(ConditionStatus::True),
            ..Default::default()
        };
        let value = serde_json::to_value(&status).expect("status should serialize");
        assert!(value.get("retryIntervalSeconds").is_some_and(serde_json::Value::is_null));
    }

    #[test]
    fn test_script_succeeded_ignores_failed_runs() {
        let mut status = AppServiceStatus::default();
        status.events_database_script_runs.push(DatabaseScriptRun {
            script_name: "update.sql".to_string(),
            status: DatabaseUpdateStatus::Failed,
        });
        assert!(!status.script_succeeded("update.sql"));

        status.events_database_script_runs.push(DatabaseScriptRun {
            script_name: "update.sql".to_string(),
            status: DatabaseUpdateStatus::Succeeded,
        });
        assert!(status.script_succeeded("update.sql"));
        assert!(!status.script_succeeded("other.sql"));
    }

    #[test]
    fn test_crd_metadata() {
        let crd = AppService::crd();
        assert_eq!(crd.spec.group, "gramola.atarazana.com");
        assert_eq!(crd.spec.names.kind, "AppService");
        assert_eq!(crd.spec.scope, "Namespaced");
    }
}
