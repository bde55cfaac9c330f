//! Descriptors consumed by the transport: repository, resource, proxy and
//! authentication information.

use std::time::SystemTime;

use regex::RegexBuilder;
use tracing::debug;
use url::Url;

/// A remote repository identified by its base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    id: String,
    url: String,
}

impl Repository {
    /// Creates a repository descriptor. The URL is stored verbatim.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    /// Repository identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Base URL that resource paths are appended to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Host part of the base URL, or an empty string when it has none.
    #[must_use]
    pub fn host(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }
}

/// A named artifact under a repository.
///
/// `last_modified` and `content_length` are filled in by a successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resource {
    name: String,
    /// Last modification time reported by the server.
    pub last_modified: Option<SystemTime>,
    /// Content length reported by the server.
    pub content_length: Option<u64>,
}

impl Resource {
    /// Creates a resource, canonicalizing `\` separators to `/`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: canonical_name(&name.into()),
            last_modified: None,
            content_length: None,
        }
    }

    /// Canonical relative path of the resource.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

fn canonical_name(name: &str) -> String {
    name.replace('\\', "/")
}

/// Credentials for the repository itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticationInfo {
    /// User name; authentication is only used when present.
    pub username: Option<String>,
    /// Password; an absent password is sent as empty.
    pub password: Option<String>,
    /// Private key path. Not used by the HTTP transport.
    pub private_key: Option<String>,
    /// Private key passphrase. Not used by the HTTP transport.
    pub passphrase: Option<String>,
}

impl AuthenticationInfo {
    /// Username/password credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }
}

/// HTTP proxy settings for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyInfo {
    /// Proxy host name.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// Proxy user name; proxy credentials are only used when present.
    pub username: Option<String>,
    /// Proxy password; an absent password is sent as empty.
    pub password: Option<String>,
    /// Hosts that bypass the proxy, separated by `|` or `,`. `*` is a wildcard.
    pub non_proxy_hosts: Option<String>,
}

impl ProxyInfo {
    /// Proxy without credentials or exclusions.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            non_proxy_hosts: None,
        }
    }

    /// Returns true when `host` matches one of the `non_proxy_hosts` patterns.
    #[must_use]
    pub fn is_excluded(&self, host: &str) -> bool {
        let Some(patterns) = self.non_proxy_hosts.as_deref() else {
            return false;
        };
        if host.is_empty() {
            return false;
        }
        non_proxy_patterns(patterns).any(|pattern| host_matches(pattern, host))
    }
}

/// Splits a non-proxy host list into its individual patterns.
pub(crate) fn non_proxy_patterns(list: &str) -> impl Iterator<Item = &str> {
    list.split(['|', ','])
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
}

fn host_matches(pattern: &str, host: &str) -> bool {
    let expression = format!(
        "^{}$",
        pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*")
    );
    match RegexBuilder::new(&expression).case_insensitive(true).build() {
        Ok(regex) => regex.is_match(host),
        Err(error) => {
            debug!(pattern, %error, "ignoring unusable non-proxy host pattern");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_host_ignores_port() {
        let repo = Repository::new("central", "http://repo.example.com:8081/maven2");
        assert_eq!(repo.host(), "repo.example.com");
    }

    #[test]
    fn test_repository_host_of_unparseable_url_is_empty() {
        let repo = Repository::new("broken", "not a url");
        assert_eq!(repo.host(), "");
    }

    #[test]
    fn test_resource_name_is_canonicalized() {
        let resource = Resource::new(r"org\acme\lib\1.0\lib-1.0.jar");
        assert_eq!(resource.name(), "org/acme/lib/1.0/lib-1.0.jar");
        assert_eq!(resource.to_string(), "org/acme/lib/1.0/lib-1.0.jar");
        assert!(resource.last_modified.is_none());
        assert!(resource.content_length.is_none());
    }

    #[test]
    fn test_proxy_exclusion_exact_and_wildcard() {
        let mut proxy = ProxyInfo::new("proxy.corp", 3128);
        proxy.non_proxy_hosts = Some("localhost|*.internal.corp, 10.0.*".to_string());

        assert!(proxy.is_excluded("localhost"));
        assert!(proxy.is_excluded("LOCALHOST"));
        assert!(proxy.is_excluded("repo.internal.corp"));
        assert!(proxy.is_excluded("10.0.3.4"));
        assert!(!proxy.is_excluded("repo.example.com"));
        assert!(!proxy.is_excluded("internal.corp.evil.com"));
    }

    #[test]
    fn test_proxy_without_exclusions_applies_everywhere() {
        let proxy = ProxyInfo::new("proxy.corp", 3128);
        assert!(!proxy.is_excluded("localhost"));
    }

    #[test]
    fn test_non_proxy_patterns_skip_blanks() {
        let patterns: Vec<_> = non_proxy_patterns("a| |b,,c").collect();
        assert_eq!(patterns, vec!["a", "b", "c"]);
    }
}
