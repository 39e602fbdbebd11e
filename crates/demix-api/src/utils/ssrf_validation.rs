//! Outbound link validation for `link` inputs.
//!
//! A link is fetched by the server, so it must not be usable to reach
//! loopback, private or link-local addresses. Literal IPs are checked directly
//! and hostnames are resolved so a public name pointing at a private address
//! is rejected too. Redirect hops are checked by the stager's HTTP client.

use demix_processing::link_policy::{is_internal_hostname, is_private_ip};
use std::net::IpAddr;
use tokio::net::lookup_host;

/// Check that `link` is an http(s) URL the server may fetch.
///
/// * `allow_private_hosts` - skip the address checks (local development and tests)
/// * `allowlist` - when set, the host must equal or be a subdomain of an entry
pub async fn validate_link(
    link: &str,
    allow_private_hosts: bool,
    allowlist: Option<&[String]>,
) -> Result<(), String> {
    let url = reqwest::Url::parse(link).map_err(|e| format!("Invalid link: {}", e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err("Link must use http:// or https://".to_string());
    }

    let host = url
        .host_str()
        .ok_or_else(|| "Link must have a host".to_string())?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_lowercase();

    if let Some(allowed) = allowlist {
        if !host_in_allowlist(&host, allowed) {
            return Err(format!("Link host '{}' is not allowed", host));
        }
    }

    if allow_private_hosts {
        return Ok(());
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err("Links to private or internal addresses are not allowed".to_string());
        }
        return Ok(());
    }

    if is_internal_hostname(&host) {
        return Err("Links to localhost or internal hostnames are not allowed".to_string());
    }

    let port = url.port_or_known_default().unwrap_or(80);
    match lookup_host((host.as_str(), port)).await {
        Ok(addrs) => {
            for addr in addrs {
                if is_private_ip(&addr.ip()) {
                    return Err(format!(
                        "Link host resolves to a private address: {}",
                        addr.ip()
                    ));
                }
            }
        }
        // The fetch itself reports unreachable hosts.
        Err(e) => tracing::warn!(host = %host, error = %e, "Could not resolve link host"),
    }

    Ok(())
}

fn host_in_allowlist(host: &str, allowlist: &[String]) -> bool {
    allowlist.iter().any(|entry| {
        let entry = entry.trim().trim_start_matches('.').to_lowercase();
        host == entry || host.ends_with(&format!(".{}", entry))
    })
}
