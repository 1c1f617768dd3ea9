//! Manifest builder and endpoint derivation.

use crate::error::{AipError, AipResult};
use crate::message::{IntakeDescriptor, Manifest, ProviderInfo};

/// Path under which intake endpoints are mounted.
pub const INTAKE_PATH_PREFIX: &str = "/api/aip";

/// Path of the bind endpoint.
pub const BIND_PATH: &str = "/api/aip/bind";

/// Path of the discovery document.
pub const DISCOVERY_PATH: &str = "/.well-known/agent-intake.json";

/// Base URL without trailing slashes.
pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// Absolute endpoint for intake `id`.
pub fn intake_endpoint(base_url: &str, id: &str) -> String {
    format!("{}{}/{}", normalize_base_url(base_url), INTAKE_PATH_PREFIX, id)
}

/// Absolute bind endpoint.
pub fn bind_endpoint(base_url: &str) -> String {
    format!("{}{}", normalize_base_url(base_url), BIND_PATH)
}

/// Absolute discovery URL.
pub fn discovery_url(base_url: &str) -> String {
    format!("{}{}", normalize_base_url(base_url), DISCOVERY_PATH)
}

/// Intake ids become a URL path segment next to `bind`.
pub fn validate_intake_id(id: &str) -> AipResult<()> {
    if id.is_empty() {
        return Err(AipError::InvalidConfig("intake id must not be empty".to_string()));
    }
    if id == "bind" {
        return Err(AipError::InvalidConfig(
            "intake id 'bind' collides with the bind endpoint".to_string(),
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AipError::InvalidConfig(format!(
            "intake id '{}' may only contain ASCII letters, digits, '-' and '_'",
            id
        )));
    }
    Ok(())
}

/// Assemble the discovery document.
///
/// Pure function of its inputs; intake order is preserved. Fails with
/// `INVALID_CONFIG` when the provider lacks a name or url.
pub fn build(
    aip_version: &str,
    provider: &ProviderInfo,
    intakes: impl IntoIterator<Item = IntakeDescriptor>,
) -> AipResult<Manifest> {
    if provider.name.trim().is_empty() {
        return Err(AipError::InvalidConfig("provider name is required".to_string()));
    }
    if provider.url.trim().is_empty() {
        return Err(AipError::InvalidConfig("provider url is required".to_string()));
    }

    Ok(Manifest {
        aip_version: aip_version.to_string(),
        provider: provider.clone(),
        intakes: intakes.into_iter().collect(),
    })
}

/// Agent-side sanity check of a fetched manifest.
pub fn check(manifest: &Manifest) -> AipResult<()> {
    if manifest.aip_version.trim().is_empty() {
        return Err(AipError::InvalidManifest("aip_version is empty".to_string()));
    }
    for (idx, intake) in manifest.intakes.iter().enumerate() {
        if intake.id.is_empty() || intake.endpoint.is_empty() {
            return Err(AipError::InvalidManifest(format!(
                "intake #{} is missing id or endpoint",
                idx
            )));
        }
        if manifest.intakes[..idx].iter().any(|prev| prev.id == intake.id) {
            return Err(AipError::InvalidManifest(format!(
                "duplicate intake id '{}'",
                intake.id
            )));
        }
    }
    Ok(())
}
