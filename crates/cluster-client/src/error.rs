//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API error not covered by a more specific variant
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Create rejected because the object already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected because the object changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Remote command could not be run or its streams could not be read
    #[error("Remote execution failed: {0}")]
    Exec(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    /// Classifies a kube error by its API status code.
    ///
    /// `what` names the object for the error message, e.g. `Deployment ns/events`.
    pub fn from_kube(err: kube::Error, what: &str) -> Self {
        match &err {
            kube::Error::Api(response) if response.code == 404 => {
                ClusterError::NotFound(what.to_string())
            }
            kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
                ClusterError::AlreadyExists(what.to_string())
            }
            kube::Error::Api(response) if response.code == 409 => {
                ClusterError::Conflict(format!("{}: {}", what, response.message))
            }
            _ => ClusterError::Kube(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} happened", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_classifies_api_status_codes() {
        assert!(ClusterError::from_kube(api_error(404, "NotFound"), "Secret ns/a").is_not_found());
        assert!(ClusterError::from_kube(api_error(409, "AlreadyExists"), "Secret ns/a").is_already_exists());
        assert!(matches!(
            ClusterError::from_kube(api_error(409, "Conflict"), "AppService ns/a"),
            ClusterError::Conflict(_)
        ));
        assert!(matches!(
            ClusterError::from_kube(api_error(500, "InternalError"), "Secret ns/a"),
            ClusterError::Kube(_)
        ));
    }
}
