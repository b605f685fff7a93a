use serde::Deserialize;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use url::{Host, Url};

/// Deployment mode the process is running in
///
/// Only `Production` restricts targets to the public network; the other modes
/// allow localhost so the scraper can be pointed at local test servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum DeploymentMode {
    #[default]
    Development,
    Test,
    Production,
}

impl DeploymentMode {
    /// Returns true if private and loopback targets must be rejected
    pub fn is_restricted(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown deployment mode: {}", other)),
        }
    }
}

impl TryFrom<String> for DeploymentMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        };
        f.write_str(name)
    }
}

/// Screens candidate URLs before they are fetched or stored
///
/// The filter is a plain value: construct it once from the configured
/// [`DeploymentMode`] and copy it wherever a check is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlSafetyFilter {
    restricted: bool,
}

impl UrlSafetyFilter {
    pub fn new(mode: DeploymentMode) -> Self {
        Self {
            restricted: mode.is_restricted(),
        }
    }

    /// A filter that always blocks private-network targets
    pub fn restricted() -> Self {
        Self { restricted: true }
    }

    /// A filter that only checks syntax and scheme
    pub fn permissive() -> Self {
        Self { restricted: false }
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    /// Returns true if `url` may be fetched or stored
    ///
    /// # Rejects
    ///
    /// - strings that do not parse as absolute URLs
    /// - any scheme other than `http` / `https`
    /// - in restricted mode: `localhost`, `*.localhost`, `*.local`, and IP
    ///   literals in loopback, private, link-local or unspecified ranges
    ///
    /// Hostnames are judged as written; no DNS lookup is performed.
    ///
    /// # Examples
    ///
    /// ```
    /// use link_scraper::url::UrlSafetyFilter;
    ///
    /// let filter = UrlSafetyFilter::restricted();
    /// assert!(filter.is_safe("https://example.com"));
    /// assert!(!filter.is_safe("http://192.168.1.1"));
    /// assert!(!filter.is_safe("ftp://example.com"));
    /// ```
    pub fn is_safe(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => self.is_safe_url(&parsed),
            Err(_) => false,
        }
    }

    /// Same as [`is_safe`](Self::is_safe) for an already parsed URL
    pub fn is_safe_url(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        if !self.restricted {
            return true;
        }

        match url.host() {
            Some(Host::Domain(domain)) => !is_local_hostname(domain),
            Some(Host::Ipv4(ip)) => !is_private_ipv4(ip),
            Some(Host::Ipv6(ip)) => !is_private_ipv6(ip),
            None => false,
        }
    }
}

fn is_local_hostname(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    domain == "localhost" || domain.ends_with(".localhost") || domain.ends_with(".local")
}

fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    // 127/8, 10/8, 172.16/12, 192.168/16, 169.254/16, 0.0.0.0
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_private_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_private_ipv4(mapped);
    }

    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}
