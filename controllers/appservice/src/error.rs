//! Controller-specific error types.
//!
//! Every failure of a reconciliation pass ends up here before it is handed
//! to the status manager, which records it and schedules the retry.

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors that can occur in the AppService Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Reconciliation was asked to handle something that is not an AppService
    #[error("Not a AppService object")]
    InvalidInputKind,

    #[error("Not a proper AppService object because Alias is not valid: {0}")]
    InvalidAlias(String),

    #[error("Not a proper AppService object because Platform is not valid: {0}")]
    InvalidPlatform(String),

    #[error("Not a proper AppService object because DomainName is not valid: {0}")]
    InvalidDomainName(String),

    /// Kubernetes store operation failed
    #[error("Store operation failed: {0}")]
    Cluster(#[from] ClusterError),

    /// A managed resource descriptor could not be built
    #[error("Unable to build {kind} descriptor: {reason}")]
    Descriptor {
        kind: &'static str,
        reason: String,
    },

    /// The migration command could not be run
    #[error("Remote execution failed: {0}")]
    RemoteExecution(String),

    /// The migration command ran but reported an error
    #[error("Database script {script} failed in pod {pod}: {output}")]
    MigrationRejected {
        script: String,
        pod: String,
        output: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// True for errors caused by the AppService spec itself.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ControllerError::InvalidInputKind
                | ControllerError::InvalidAlias(_)
                | ControllerError::InvalidPlatform(_)
                | ControllerError::InvalidDomainName(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_classified() {
        assert!(ControllerError::InvalidAlias("Walkman".to_string()).is_validation());
        assert!(!ControllerError::RemoteExecution("closed".to_string()).is_validation());
        assert!(!ControllerError::Cluster(ClusterError::NotFound("AppService demo/gramola".to_string())).is_validation());
    }

    #[test]
    fn test_messages_name_the_offending_field() {
        assert_eq!(
            ControllerError::InvalidDomainName("bad_domain!".to_string()).to_string(),
            "Not a proper AppService object because DomainName is not valid: bad_domain!"
        );
    }
}
