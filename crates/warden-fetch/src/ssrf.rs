//! Server-side request forgery guard.
//!
//! An attacker who controls fetched content controls URLs the gateway may
//! be asked to fetch next. Every candidate address, on every redirect hop,
//! is checked against the internal-network ranges before a connection is
//! attempted: literal IPs directly, hostnames through resolution, so a DNS
//! record pointing at 10.0.0.1 is caught the same as the literal.

use std::net::IpAddr;

use tokio::net::lookup_host;
use url::{Host, Url};

use crate::FetchError;

/// Is this address one the gateway must never connect to?
pub fn is_forbidden_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_multicast()
                // CGNAT 100.64.0.0/10
                || (octets[0] == 100 && (octets[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_forbidden_ip(IpAddr::V4(mapped));
            }
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                // Unique-local fc00::/7
                || (segments[0] & 0xFE00) == 0xFC00
                // Link-local fe80::/10
                || (segments[0] & 0xFFC0) == 0xFE80
        }
    }
}

/// Validate scheme and address of one URL.
///
/// Hostnames are resolved and every returned address must pass; an empty
/// resolution is a transport problem and surfaces as such later, so it is
/// not treated as a violation here.
pub async fn check_url(url: &Url) -> Result<(), FetchError> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(FetchError::SchemeNotAllowed {
                scheme: other.to_string(),
            })
        }
    }

    match url.host() {
        None => Err(FetchError::InvalidUrl {
            detail: "url has no host".to_string(),
        }),
        Some(Host::Ipv4(ip)) => {
            if is_forbidden_ip(IpAddr::V4(ip)) {
                Err(FetchError::Ssrf {
                    detail: format!("literal address {ip} is in a forbidden range"),
                })
            } else {
                Ok(())
            }
        }
        Some(Host::Ipv6(ip)) => {
            if is_forbidden_ip(IpAddr::V6(ip)) {
                Err(FetchError::Ssrf {
                    detail: format!("literal address {ip} is in a forbidden range"),
                })
            } else {
                Ok(())
            }
        }
        Some(Host::Domain(domain)) => {
            let port = url.port_or_known_default().unwrap_or(443);
            let addrs = lookup_host((domain, port)).await.map_err(FetchError::Io)?;
            for addr in addrs {
                if is_forbidden_ip(addr.ip()) {
                    return Err(FetchError::Ssrf {
                        detail: format!("{domain} resolves to forbidden address {}", addr.ip()),
                    });
                }
            }
            Ok(())
        }
    }
}

/// Cheap synchronous variant for literal-IP URLs: catches the violation
/// before any async work when no resolution is needed.
pub fn check_literal(url: &Url) -> Result<(), FetchError> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(FetchError::SchemeNotAllowed {
                scheme: other.to_string(),
            })
        }
    }
    let ip = match url.host() {
        Some(Host::Ipv4(ip)) => Some(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => Some(IpAddr::V6(ip)),
        Some(Host::Domain(_)) => None,
        None => {
            return Err(FetchError::InvalidUrl {
                detail: "url has no host".to_string(),
            })
        }
    };
    if let Some(ip) = ip {
        if is_forbidden_ip(ip) {
            return Err(FetchError::Ssrf {
                detail: format!("literal address {ip} is in a forbidden range"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_forbidden_v4_ranges() {
        for addr in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.9",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "255.255.255.255",
            "224.0.0.1",
        ] {
            assert!(is_forbidden_ip(ip(addr)), "{addr} should be forbidden");
        }
    }

    #[test]
    fn test_public_v4_allowed() {
        for addr in ["93.184.216.34", "8.8.8.8", "100.128.0.1", "172.32.0.1"] {
            assert!(!is_forbidden_ip(ip(addr)), "{addr} should be allowed");
        }
    }

    #[test]
    fn test_forbidden_v6_ranges() {
        for addr in ["::1", "::", "fc00::1", "fd12::99", "fe80::1", "ff02::1"] {
            assert!(is_forbidden_ip(ip(addr)), "{addr} should be forbidden");
        }
    }

    #[test]
    fn test_v4_mapped_v6_checked_as_v4() {
        assert!(is_forbidden_ip(ip("::ffff:127.0.0.1")));
        assert!(!is_forbidden_ip(ip("::ffff:8.8.8.8")));
    }

    #[test]
    fn test_public_v6_allowed() {
        assert!(!is_forbidden_ip(ip("2606:2800:220:1::1")));
    }

    #[test]
    fn test_literal_loopback_rejected() {
        let url = Url::parse("http://127.0.0.1:8000/x").unwrap();
        assert!(matches!(check_literal(&url), Err(FetchError::Ssrf { .. })));
    }

    #[test]
    fn test_literal_scheme_rejected() {
        let url = Url::parse("ftp://example.com/x").unwrap();
        assert!(matches!(
            check_literal(&url),
            Err(FetchError::SchemeNotAllowed { .. })
        ));
    }

    #[test]
    fn test_literal_domain_passes_without_resolution() {
        let url = Url::parse("https://example.com/").unwrap();
        assert!(check_literal(&url).is_ok());
    }

    #[tokio::test]
    async fn test_check_url_literal_loopback() {
        let url = Url::parse("http://[::1]/admin").unwrap();
        assert!(matches!(check_url(&url).await, Err(FetchError::Ssrf { .. })));
    }
}
