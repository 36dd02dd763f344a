//! One-time defaulting of a freshly created AppService.

use crds::{AppService, Platform, DEFAULT_DOMAIN_NAME};

/// Result of [`initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initialization {
    /// Nothing changed
    AlreadyInitialized,
    /// Defaults were applied in memory and must be persisted before any
    /// managed resource is touched
    JustInitialized,
}

/// Applies spec defaults once: platform `kubernetes`, and on kubernetes the
/// default domain name. Marks the spec as initialized.
pub fn initialize(app: &mut AppService) -> Initialization {
    let spec = &mut app.spec;
    if spec.initialized {
        return Initialization::AlreadyInitialized;
    }

    if spec.platform.as_deref().map_or(true, str::is_empty) {
        spec.platform = Some(Platform::Kubernetes.as_str().to_string());
    }
    if spec.platform() == Some(Platform::Kubernetes) && spec.domain_name.as_deref().map_or(true, str::is_empty) {
        spec.domain_name = Some(DEFAULT_DOMAIN_NAME.to_string());
    }
    spec.initialized = true;

    Initialization::JustInitialized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_app_service;

    #[test]
    fn test_defaults_platform_and_domain() {
        let mut app = create_test_app_service("gramola", "demo");
        assert_eq!(initialize(&mut app), Initialization::JustInitialized);

        assert!(app.spec.initialized);
        assert_eq!(app.spec.platform.as_deref(), Some("kubernetes"));
        assert_eq!(app.spec.domain_name.as_deref(), Some(DEFAULT_DOMAIN_NAME));
    }

    #[test]
    fn test_keeps_user_values() {
        let mut app = create_test_app_service("gramola", "demo");
        app.spec.platform = Some("openshift".to_string());
        initialize(&mut app);

        assert_eq!(app.spec.platform.as_deref(), Some("openshift"));
        assert_eq!(app.spec.domain_name, None);
    }

    #[test]
    fn test_second_call_is_a_no_op() {
        let mut app = create_test_app_service("gramola", "demo");
        initialize(&mut app);
        let snapshot = app.clone();

        assert_eq!(initialize(&mut app), Initialization::AlreadyInitialized);
        assert_eq!(app, snapshot);
    }
}
