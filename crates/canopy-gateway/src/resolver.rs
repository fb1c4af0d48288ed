//! Hostname to subdomain resolution.
//!
//! The routing decision is keyed solely on the Host header's first label.

use crate::error::GatewayError;

/// Extract the subdomain from a Host header value.
///
/// An optional port is stripped first; IPv6 literal hosts have no labels
/// and are rejected. The first dot-separated label is the subdomain.
pub fn extract_subdomain(host: &str) -> Result<&str, GatewayError> {
    if host.is_empty() || host.starts_with('[') {
        return Err(GatewayError::MissingHost);
    }

    let without_port = host.split(':').next().unwrap_or(host);
    let label = without_port.split('.').next().unwrap_or_default();

    if label.is_empty() {
        return Err(GatewayError::MissingHost);
    }

    Ok(label)
}
