//! Address rules for server-side link fetches.
//!
//! Shared by request validation (first URL, after DNS resolution) and by the
//! stager's redirect policy (every hop).

use reqwest::redirect::{Attempt, Policy};
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Redirect hops followed for a single link.
pub const MAX_REDIRECTS: usize = 5;

/// Hostnames that never point at the public internet.
pub fn is_internal_hostname(host: &str) -> bool {
    host == "localhost"
        || host.ends_with(".localhost")
        || host.ends_with(".local")
        || host.ends_with(".internal")
        || host.ends_with(".corp")
}

/// Loopback, private, link-local, CGNAT and other non-routable addresses.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_ipv4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_ipv4(&v4),
            None => is_private_ipv6(v6),
        },
    }
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || a == 0
        // 100.64.0.0/10 shared address space
        || (a == 100 && (64..=127).contains(&b))
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || first & 0xffc0 == 0xfe80 // link-local
        || first & 0xfe00 == 0xfc00 // unique local
}

/// Why a redirect target must not be followed, if it must not.
///
/// Checks scheme, IP literals and internal hostnames; names are not resolved here.
pub fn redirect_violation(url: &Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return Some(format!("redirect to unsupported scheme '{}'", url.scheme()));
    }

    let host = match url.host_str() {
        Some(host) => host.trim_start_matches('[').trim_end_matches(']').to_lowercase(),
        None => return Some("redirect target has no host".to_string()),
    };

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Some(format!("redirect to private address {}", ip));
        }
    } else if is_internal_hostname(&host) {
        return Some(format!("redirect to internal host {}", host));
    }

    None
}

/// Redirect policy for link fetches. With `allow_private_hosts` only the hop
/// count is limited; otherwise every hop must pass [`redirect_violation`].
pub fn redirect_policy(allow_private_hosts: bool) -> Policy {
    if allow_private_hosts {
        return Policy::limited(MAX_REDIRECTS);
    }

    Policy::custom(|attempt: Attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        match redirect_violation(attempt.url()) {
            Some(reason) => {
                tracing::warn!(target_url = %attempt.url(), reason = %reason, "Rejected link redirect");
                attempt.error(reason)
            }
            None => attempt.follow(),
        }
    })
}
