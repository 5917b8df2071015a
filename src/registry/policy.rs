// Registry URL policy - the anti-SSRF boundary
//
// Validation happens once, at client construction. Query parameters and
// redirects never re-enter this check, so nothing past construction may
// widen the set of reachable hosts.

use crate::error::RegistryError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Domain suffix the registry service lives under.
pub const SERVICE_DOMAIN: &str = "devstrap.dev";

/// Hosts outside the service domain that are still allowed.
pub const ALLOWED_HOSTS: &[&str] = &["plugins.devstrap.dev", "registry.devstrap.dev"];

/// Port a local development registry is allowed to listen on.
pub const LOCAL_DEV_PORT: u16 = 8443;

/// RFC 1035 upper bound on a hostname.
const MAX_HOST_LEN: usize = 253;

/// Validate a registry base URL against the allowlist policy.
///
/// Accepts if and only if:
/// - the scheme is HTTPS,
/// - the host is non-empty and within the hostname length limit,
/// - the host is not loopback, private, or link-local (lexically),
/// - the host is under [`SERVICE_DOMAIN`] or listed in [`ALLOWED_HOSTS`].
///
/// The single exception is `localhost:<dev port>`, permitted for local
/// registry development.
pub fn validate_registry_url(raw: &str) -> Result<Url, RegistryError> {
    let url = Url::parse(raw).map_err(|e| RegistryError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "https" {
        return Err(RegistryError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("scheme must be https, got '{}'", url.scheme()),
        });
    }

    let host = match url.host() {
        Some(h) => h,
        None => {
            return Err(RegistryError::InvalidUrl {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            })
        }
    };

    let host_str = host.to_string();
    if host_str.is_empty() {
        return Err(RegistryError::InvalidUrl {
            url: raw.to_string(),
            reason: "empty host".to_string(),
        });
    }
    if host_str.len() > MAX_HOST_LEN {
        return Err(RegistryError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("host exceeds {MAX_HOST_LEN} characters"),
        });
    }

    // Local development carve-out: localhost on the dev port only.
    if host_str.eq_ignore_ascii_case("localhost") {
        if url.port() == Some(LOCAL_DEV_PORT) {
            return Ok(url);
        }
        return Err(RegistryError::PrivateAddress(host_str));
    }

    if is_private_host(&host) {
        return Err(RegistryError::PrivateAddress(host_str));
    }

    if !is_allowed_domain(&host_str) {
        return Err(RegistryError::HostNotAllowed(host_str));
    }

    Ok(url)
}

/// Lexical check for loopback, private, and link-local addresses.
///
/// Applied to the hostname as written; no DNS resolution is performed.
fn is_private_host(host: &Host<&str>) -> bool {
    match host {
        Host::Ipv4(addr) => is_private_ipv4(*addr),
        Host::Ipv6(addr) => is_private_ipv6(*addr),
        Host::Domain(name) => {
            // Dotted-quad hosts sometimes arrive unparsed (e.g. with a
            // trailing dot); try again as an address before trusting the
            // domain path.
            match name.trim_end_matches('.').parse::<Ipv4Addr>() {
                Ok(addr) => is_private_ipv4(addr),
                Err(_) => false,
            }
        }
    }
}

fn is_private_ipv4(addr: Ipv4Addr) -> bool {
    addr.is_loopback() || addr.is_private() || addr.is_link_local() || addr.is_unspecified()
}

fn is_private_ipv6(addr: Ipv6Addr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() {
        return true;
    }
    let segments = addr.segments();
    // fc00::/7 unique-local, fe80::/10 link-local
    (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80
}

fn is_allowed_domain(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    if ALLOWED_HOSTS.iter().any(|allowed| host == *allowed) {
        return true;
    }
    host == SERVICE_DOMAIN || host.ends_with(&format!(".{SERVICE_DOMAIN}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_service_domain_and_subdomains() {
        assert!(validate_registry_url("https://devstrap.dev").is_ok());
        assert!(validate_registry_url("https://registry.devstrap.dev").is_ok());
        assert!(validate_registry_url("https://eu.registry.devstrap.dev").is_ok());
        assert!(validate_registry_url("https://plugins.devstrap.dev/api").is_ok());
    }

    #[test]
    fn rejects_non_https() {
        assert!(validate_registry_url("http://registry.devstrap.dev").is_err());
        assert!(validate_registry_url("ftp://registry.devstrap.dev").is_err());
        assert!(validate_registry_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(validate_registry_url("").is_err());
        assert!(validate_registry_url("not a url").is_err());
        assert!(validate_registry_url("https://").is_err());
    }

    #[test]
    fn rejects_foreign_hosts() {
        let err = validate_registry_url("https://evil.example.com").unwrap_err();
        assert!(matches!(err, RegistryError::HostNotAllowed(_)));

        // Lookalike suffix must not pass.
        assert!(validate_registry_url("https://devstrap.dev.evil.com").is_err());
        assert!(validate_registry_url("https://notdevstrap.dev").is_err());
    }

    #[test]
    fn rejects_private_ipv4_ranges() {
        for url in [
            "https://127.0.0.1",
            "https://127.1.2.3",
            "https://10.0.0.1",
            "https://10.255.255.255",
            "https://172.16.0.1",
            "https://172.31.4.4",
            "https://192.168.1.1",
            "https://169.254.169.254",
            "https://0.0.0.0",
        ] {
            let err = validate_registry_url(url).unwrap_err();
            assert!(
                matches!(err, RegistryError::PrivateAddress(_)),
                "{url} should be rejected as private"
            );
        }
    }

    #[test]
    fn rejects_private_ipv6() {
        for url in [
            "https://[::1]",
            "https://[fc00::1]",
            "https://[fd12:3456::1]",
            "https://[fe80::1]",
            "https://[::]",
        ] {
            let err = validate_registry_url(url).unwrap_err();
            assert!(
                matches!(err, RegistryError::PrivateAddress(_)),
                "{url} should be rejected as private"
            );
        }
    }

    #[test]
    fn public_ip_is_not_private_but_still_off_allowlist() {
        let err = validate_registry_url("https://203.0.113.7").unwrap_err();
        assert!(matches!(err, RegistryError::HostNotAllowed(_)));
    }

    #[test]
    fn localhost_dev_port_exception() {
        assert!(validate_registry_url("https://localhost:8443").is_ok());
        assert!(validate_registry_url("https://localhost").is_err());
        assert!(validate_registry_url("https://localhost:9000").is_err());
        assert!(validate_registry_url("https://LOCALHOST:9000").is_err());
    }

    #[test]
    fn rejects_overlong_hosts() {
        let label = "a".repeat(63);
        let host = format!("{label}.{label}.{label}.{label}.devstrap.dev");
        assert!(host.len() > 253);
        assert!(validate_registry_url(&format!("https://{host}")).is_err());
    }
}
