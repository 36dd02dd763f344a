//! AppService validation.
//!
//! Runs before anything is written: an invalid spec is reported through
//! the error path and nothing is created for it.

use crate::error::ControllerError;
use crate::event_filter::WatchedObject;
use crds::{Alias, AppService, Platform, DOMAIN_NAME_PATTERN};
use regex::Regex;
use std::sync::LazyLock;

static DOMAIN_NAME: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(DOMAIN_NAME_PATTERN));

/// Checks the watched object is a well-formed AppService.
///
/// Alias and platform are only checked when set; the domain name must
/// match on kubernetes even when empty, since the initializer only fills
/// it in after validation passes.
pub fn validate(object: WatchedObject<'_>) -> Result<&AppService, ControllerError> {
    let WatchedObject::AppService(app) = object else {
        return Err(ControllerError::InvalidInputKind);
    };

    if let Some(alias) = app.spec.alias.as_deref().filter(|a| !a.is_empty()) {
        alias
            .parse::<Alias>()
            .map_err(|_| ControllerError::InvalidAlias(alias.to_string()))?;
    }

    let platform = match app.spec.platform.as_deref().filter(|p| !p.is_empty()) {
        Some(raw) => Some(
            raw.parse::<Platform>()
                .map_err(|_| ControllerError::InvalidPlatform(raw.to_string()))?,
        ),
        None => None,
    };

    if platform == Some(Platform::Kubernetes) {
        let domain = app.spec.domain_name.as_deref().unwrap_or_default();
        if !is_valid_domain_name(domain)? {
            return Err(ControllerError::InvalidDomainName(domain.to_string()));
        }
    }

    Ok(app)
}

fn is_valid_domain_name(domain: &str) -> Result<bool, ControllerError> {
    match &*DOMAIN_NAME {
        Ok(pattern) => Ok(pattern.is_match(domain)),
        Err(e) => Err(ControllerError::InvalidDomainName(format!("pattern does not compile: {}", e))),
    }
}
