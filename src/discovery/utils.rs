use rand::distributions::Alphanumeric;
use rand::Rng;

const SUBSCRIPTION_ID_LEN: usize = 32;
const MAX_LABEL_LEN: usize = 63;

/// Random alphanumeric identifier for a REQ subscription
pub fn subscription_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUBSCRIPTION_ID_LEN)
        .map(char::from)
        .collect()
}

/// Drop a trailing `:port` if present
fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

/// Check that a host is made of dot-separated DNS labels.
///
/// Each label is 1 to 63 ASCII alphanumerics or hyphens and neither starts
/// nor ends with a hyphen.
pub fn is_valid_domain(host: &str) -> bool {
    let host = strip_port(host);
    if host.is_empty() {
        return false;
    }

    host.split('.').all(|label| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                bytes.len() <= MAX_LABEL_LEN
                    && first.is_ascii_alphanumeric()
                    && last.is_ascii_alphanumeric()
                    && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
            }
            _ => false,
        }
    })
}

/// Check for dotted-decimal IPv4 shape: four groups of one to three digits
pub fn is_valid_ipv4(host: &str) -> bool {
    let host = strip_port(host);
    let groups: Vec<&str> = host.split('.').collect();

    groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_id_shape() {
        let id = subscription_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, subscription_id());
    }

    #[test]
    fn test_valid_domains() {
        assert!(is_valid_domain("relay.damus.io"));
        assert!(is_valid_domain("localhost"));
        assert!(is_valid_domain("nostr-relay.example.com:8080"));
        assert!(is_valid_domain("xn--bcher-kva.example"));
    }

    #[test]
    fn test_invalid_domains() {
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("-relay.example"));
        assert!(!is_valid_domain("relay-.example"));
        assert!(!is_valid_domain("relay..example"));
        assert!(!is_valid_domain("relay.example."));
        assert!(!is_valid_domain("relay_one.example"));
        assert!(!is_valid_domain(&"a".repeat(64)));
    }

    #[test]
    fn test_ipv4_shape() {
        assert!(is_valid_ipv4("127.0.0.1"));
        assert!(is_valid_ipv4("8.8.8.8:443"));
        assert!(!is_valid_ipv4("1.2.3"));
        assert!(!is_valid_ipv4("1.2.3.4.5"));
        assert!(!is_valid_ipv4("1.2.3.abcd"));
        assert!(!is_valid_ipv4("1234.2.3.4"));
    }
}
