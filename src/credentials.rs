//! Per-session credential resolution.
//!
//! Credentials are picked per target host and port each time a request is
//! built, instead of through a handler installed for the whole process.

use crate::repository::{AuthenticationInfo, ProxyInfo};

/// A username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password, empty when none was configured.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Chooses which credentials answer a request to a given host and port.
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    proxy: Option<ProxyCredentials>,
    repository: Option<Credentials>,
}

#[derive(Debug, Clone)]
struct ProxyCredentials {
    host: String,
    port: u16,
    credentials: Credentials,
}

impl CredentialResolver {
    /// Builds a resolver from the session's proxy and authentication info.
    ///
    /// Proxy credentials take part only when the proxy has a username, and
    /// repository credentials only when the authentication info has one.
    #[must_use]
    pub fn new(proxy: Option<&ProxyInfo>, auth: Option<&AuthenticationInfo>) -> Self {
        let proxy = proxy.and_then(|proxy| {
            proxy.username.as_ref().map(|username| ProxyCredentials {
                host: proxy.host.clone(),
                port: proxy.port,
                credentials: Credentials {
                    username: username.clone(),
                    password: proxy.password.clone().unwrap_or_default(),
                },
            })
        });
        let repository = auth.and_then(|auth| {
            auth.username.as_ref().map(|username| Credentials {
                username: username.clone(),
                password: auth.password.clone().unwrap_or_default(),
            })
        });
        Self { proxy, repository }
    }

    /// True when the session has proxy credentials.
    #[must_use]
    pub fn has_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// True when the session has repository credentials.
    #[must_use]
    pub fn has_authentication(&self) -> bool {
        self.repository.is_some()
    }

    /// Resolves credentials for a request to `host:port`.
    ///
    /// The proxy is checked first: a target equal to the proxy address gets
    /// the proxy credentials. Anything else gets the repository credentials,
    /// if there are any.
    #[must_use]
    pub fn resolve(&self, host: &str, port: Option<u16>) -> Option<&Credentials> {
        if let Some(proxy) = &self.proxy
            && proxy.host == host
            && port == Some(proxy.port)
        {
            return Some(&proxy.credentials);
        }
        self.repository.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn proxy_with_user() -> ProxyInfo {
        let mut proxy = ProxyInfo::new("proxy.corp", 3128);
        proxy.username = Some("proxy-user".to_string());
        proxy
    }

    #[test]
    fn test_no_usernames_means_no_credentials() {
        let proxy = ProxyInfo::new("proxy.corp", 3128);
        let auth = AuthenticationInfo::default();
        let resolver = CredentialResolver::new(Some(&proxy), Some(&auth));
        assert!(!resolver.has_proxy());
        assert!(!resolver.has_authentication());
        assert!(resolver.resolve("proxy.corp", Some(3128)).is_none());
        assert!(resolver.resolve("repo.example.com", Some(80)).is_none());
    }

    #[test]
    fn test_proxy_target_gets_proxy_credentials_with_empty_password() {
        let auth = AuthenticationInfo::basic("deployer", "secret");
        let resolver = CredentialResolver::new(Some(&proxy_with_user()), Some(&auth));

        let creds = resolver.resolve("proxy.corp", Some(3128)).unwrap();
        assert_eq!(creds.username, "proxy-user");
        assert_eq!(creds.password, "");
    }

    #[test]
    fn test_other_targets_fall_back_to_repository_credentials() {
        let auth = AuthenticationInfo::basic("deployer", "secret");
        let resolver = CredentialResolver::new(Some(&proxy_with_user()), Some(&auth));

        let creds = resolver.resolve("repo.example.com", Some(80)).unwrap();
        assert_eq!(creds.username, "deployer");
        assert_eq!(creds.password, "secret");

        // Same host, different port is not the proxy.
        let creds = resolver.resolve("proxy.corp", Some(8080)).unwrap();
        assert_eq!(creds.username, "deployer");
    }

    #[test]
    fn test_proxy_only_resolver_defers_for_other_targets() {
        let resolver = CredentialResolver::new(Some(&proxy_with_user()), None);
        assert!(resolver.has_proxy());
        assert!(resolver.resolve("repo.example.com", Some(80)).is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let auth = AuthenticationInfo::basic("deployer", "hunter2");
        let resolver = CredentialResolver::new(None, Some(&auth));
        let rendered = format!("{resolver:?}");
        assert!(rendered.contains("deployer"));
        assert!(!rendered.contains("hunter2"));
    }
}
