//! Controller configuration.
//!
//! Everything is read from the environment once at startup and passed down
//! explicitly; nothing below `main` reads environment variables.

use crate::error::ControllerError;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Name the controller reports events under.
pub const CONTROLLER_NAME: &str = "appservice-controller";

const DEFAULT_METRICS_PORT: u16 = 8080;
const DEFAULT_CONCURRENCY: u16 = 3;

/// Upper bound on a single remote `psql` run.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(300);

/// Runtime configuration of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch, all namespaces when `None`
    pub namespace: Option<String>,
    /// Directory holding `db/<script>` migration files
    pub scripts_base_dir: PathBuf,
    pub metrics_port: u16,
    /// Maximum number of AppServices reconciled in parallel
    pub concurrency: u16,
    /// Reporter instance attached to published events
    pub instance: Option<String>,
    /// How long the database migration may run inside the pod
    pub exec_timeout: Duration,
}

impl ControllerConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());
        let scripts_base_dir = PathBuf::from(lookup("DB_SCRIPTS_BASE_DIR").unwrap_or_default());

        let metrics_port = match lookup("METRICS_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                ControllerError::InvalidConfig(format!("METRICS_PORT '{}' is not a valid port: {}", raw, e))
            })?,
            None => DEFAULT_METRICS_PORT,
        };

        let concurrency = match lookup("CONTROLLER_CONCURRENCY") {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(value) if value > 0 => value,
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "CONTROLLER_CONCURRENCY '{}' must be a positive integer",
                        raw
                    )));
                }
            },
            None => DEFAULT_CONCURRENCY,
        };

        let exec_timeout = match lookup("EXEC_TIMEOUT_SECONDS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "EXEC_TIMEOUT_SECONDS '{}' must be a positive number of seconds",
                        raw
                    )));
                }
            },
            None => DEFAULT_EXEC_TIMEOUT,
        };

        Ok(Self {
            namespace,
            scripts_base_dir,
            metrics_port,
            concurrency,
            instance: lookup("HOSTNAME"),
            exec_timeout,
        })
    }
}

/// Database migration scripts, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseScripts {
    update_script: String,
    contents: BTreeMap<String, String>,
}

impl DatabaseScripts {
    /// File name of the events database update script.
    pub const UPDATE_SCRIPT: &'static str = "events-database-update-0.0.2.sql";

    /// Placeholder replaced with the database user in every script.
    const USERNAME_PLACEHOLDER: &'static str = "{{DB_USERNAME}}";

    /// Reads `<base_dir>/db/<script>` for every known script.
    ///
    /// A script that cannot be read is logged and left out; the config
    /// bundle is then created without it and the migration reports the
    /// failure when it runs.
    pub async fn load(base_dir: &Path, db_username: &str) -> Self {
        let mut contents = BTreeMap::new();
        let path = base_dir.join("db").join(Self::UPDATE_SCRIPT);
        match tokio::fs::read_to_string(&path).await {
            Ok(script) => {
                info!("Loaded database script {}", path.display());
                contents.insert(
                    Self::UPDATE_SCRIPT.to_string(),
                    script.replace(Self::USERNAME_PLACEHOLDER, db_username),
                );
            }
            Err(e) => warn!("Unable to read database script {}: {}", path.display(), e),
        }
        Self {
            update_script: Self::UPDATE_SCRIPT.to_string(),
            contents,
        }
    }

    /// Scripts given in memory, keyed by file name.
    pub fn from_contents(contents: BTreeMap<String, String>) -> Self {
        Self {
            update_script: Self::UPDATE_SCRIPT.to_string(),
            contents,
        }
    }

    /// Name of the script the migration runner applies.
    pub fn update_script(&self) -> &str {
        &self.update_script
    }

    /// Script bodies keyed by file name, as mounted into the database pod.
    pub fn contents(&self) -> &BTreeMap<String, String> {
        &self.contents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = ControllerConfig::from_lookup(lookup_from(&[])).expect("config should load");
        assert_eq!(config.namespace, None);
        assert_eq!(config.metrics_port, 8080);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.scripts_base_dir, PathBuf::new());
        assert_eq!(config.exec_timeout, DEFAULT_EXEC_TIMEOUT);
    }

    #[test]
    fn test_exec_timeout_is_read_in_seconds() {
        let config = ControllerConfig::from_lookup(lookup_from(&[("EXEC_TIMEOUT_SECONDS", "45")]))
            .expect("config should load");
        assert_eq!(config.exec_timeout, Duration::from_secs(45));

        let result = ControllerConfig::from_lookup(lookup_from(&[("EXEC_TIMEOUT_SECONDS", "soon")]));
        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));
    }

    #[test]
    fn test_reads_namespace_and_port() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("WATCH_NAMESPACE", "gramola"),
            ("METRICS_PORT", "9090"),
            ("DB_SCRIPTS_BASE_DIR", "/opt/scripts"),
        ]))
        .expect("config should load");
        assert_eq!(config.namespace.as_deref(), Some("gramola"));
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.scripts_base_dir, PathBuf::from("/opt/scripts"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = ControllerConfig::from_lookup(lookup_from(&[("METRICS_PORT", "http")]));
        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let result = ControllerConfig::from_lookup(lookup_from(&[("CONTROLLER_CONCURRENCY", "0")]));
        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_load_replaces_username_placeholder() {
        let base = std::env::temp_dir().join(format!("appservice-scripts-{}", std::process::id()));
        tokio::fs::create_dir_all(base.join("db")).await.expect("create temp dir");
        tokio::fs::write(
            base.join("db").join(DatabaseScripts::UPDATE_SCRIPT),
            "GRANT ALL ON events TO {{DB_USERNAME}};",
        )
        .await
        .expect("write script");

        let scripts = DatabaseScripts::load(&base, "luke").await;
        assert_eq!(
            scripts.contents().get(DatabaseScripts::UPDATE_SCRIPT).map(String::as_str),
            Some("GRANT ALL ON events TO luke;")
        );

        tokio::fs::remove_dir_all(&base).await.expect("cleanup temp dir");
    }

    #[tokio::test]
    async fn test_load_tolerates_missing_script() {
        let scripts = DatabaseScripts::load(Path::new("/nonexistent/appservice"), "luke").await;
        assert!(scripts.contents().is_empty());
        assert_eq!(scripts.update_script(), DatabaseScripts::UPDATE_SCRIPT);
    }
}
