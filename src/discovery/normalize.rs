use std::collections::HashSet;
use url::Url;

use super::utils::{is_valid_domain, is_valid_ipv4};
use crate::{
    models::NostrEvent,
    utils::{has_relay_scheme, RELAY_SCHEMES},
};

/// Validate a raw relay reference and bring it into canonical `ws[s]://host` form.
///
/// Scheme-less input gets `ws://` when it points at a loopback host and
/// `wss://` otherwise. Input that already names some other scheme is
/// rejected. Returns `None` for anything that is not a usable relay URL.
pub fn normalize_relay_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let candidate = if has_relay_scheme(raw) || has_explicit_scheme(raw) {
        raw.to_string()
    } else if raw.contains("localhost") || raw.contains("127.0.0.1") {
        format!("ws://{}", raw)
    } else {
        format!("wss://{}", raw)
    };

    let url = Url::parse(&candidate).ok()?;
    if !RELAY_SCHEMES.contains(&url.scheme()) {
        return None;
    }

    let host = url.host_str().filter(|h| !h.is_empty())?;
    if !is_valid_domain(host) && !is_valid_ipv4(host) {
        return None;
    }

    let mut canonical = String::from(url.as_str());
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        canonical.pop();
    }

    Some(canonical)
}

/// Whether the text before the first `://` is a bare scheme token
fn has_explicit_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once("://") else {
        return false;
    };

    scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Collect relay references from event tags.
///
/// `["r", <url>, ...]` names a relay directly. `["p", <pubkey>, <url>, ...]`
/// carries a relay hint in its third element; this is a protocol
/// convention that is applied to every event kind. References are
/// normalised, rejects are dropped and duplicates collapse to their first
/// occurrence so the output order is stable for a given input.
pub fn extract_candidates(events: &[NostrEvent]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for event in events {
        for tag in &event.tags {
            let reference = match tag.first().map(String::as_str) {
                Some("r") => tag.get(1),
                Some("p") if tag.len() >= 3 => tag.get(2),
                _ => None,
            };

            let Some(url) = reference.and_then(|r| normalize_relay_url(r)) else {
                continue;
            };

            if seen.insert(url.clone()) {
                candidates.push(url);
            }
        }
    }

    candidates
}
