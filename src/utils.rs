// General utility functions for the application
use url::{Host, Url};

use crate::error::AppError;

/// Schemes a relay can be reached on
pub const RELAY_SCHEMES: [&str; 2] = ["ws", "wss"];

/// Whether a string starts with one of the relay transport schemes
pub fn has_relay_scheme(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}

/// Extracts the bare host of a relay URL, dropping any explicit port.
///
/// IPv6 hosts come back without their brackets so the result can be handed
/// straight to the resolver.
pub fn extract_host(relay_url: &str) -> Result<String, AppError> {
    if !has_relay_scheme(relay_url) {
        return Err(AppError::ValidationError(format!(
            "invalid relay URL scheme: {}",
            relay_url
        )));
    }

    let parsed = Url::parse(relay_url)
        .map_err(|e| AppError::ValidationError(format!("failed to parse URL {}: {}", relay_url, e)))?;

    match parsed.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        _ => Err(AppError::ValidationError(format!(
            "relay URL has no host: {}",
            relay_url
        ))),
    }
}
