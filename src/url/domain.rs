use std::net::IpAddr;

/// Registrable-domain breakdown of a host name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostParts {
    /// Public suffix (e.g. "com", "co.uk")
    pub suffix: String,
    /// Registrable domain (e.g. "example.co.uk")
    pub domain: String,
    /// Labels left of the registrable domain, without the trailing dot
    pub subdomain: String,
}

/// Splits a lowercase host into suffix, registrable domain and subdomain
///
/// The public-suffix list decides where the registrable domain begins. IP
/// literals and hosts the list cannot place (e.g. "localhost") are treated as
/// their own domain with an empty subdomain.
///
/// # Examples
///
/// ```
/// use sumi_engine::url::split_host;
///
/// let parts = split_host("www.xyz.abc.com");
/// assert_eq!(parts.domain, "abc.com");
/// assert_eq!(parts.subdomain, "www.xyz");
/// assert_eq!(parts.suffix, "com");
/// ```
pub fn split_host(host: &str) -> HostParts {
    if is_ip_literal(host) {
        return HostParts {
            suffix: String::new(),
            domain: host.to_string(),
            subdomain: String::new(),
        };
    }

    let suffix = psl::suffix_str(host).unwrap_or_default().to_string();

    let domain = match psl::domain_str(host) {
        Some(domain) => domain.to_string(),
        None => {
            return HostParts {
                suffix,
                domain: host.to_string(),
                subdomain: String::new(),
            }
        }
    };

    let subdomain = host
        .strip_suffix(domain.as_str())
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or_default()
        .to_string();

    HostParts {
        suffix,
        domain,
        subdomain,
    }
}

fn is_ip_literal(host: &str) -> bool {
    host.starts_with('[') || host.parse::<IpAddr>().is_ok()
}
