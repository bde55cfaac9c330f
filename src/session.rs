//! Connection session lifecycle.
//!
//! Opening a session snapshots the ambient proxy values, overrides them with
//! the session's proxy, and builds the HTTP client that every transfer of
//! the session uses. Closing it puts the snapshot back.

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder};
use tracing::{debug, info};
use url::Url;

use crate::client::{build_client, header_map};
use crate::config::TransportConfig;
use crate::credentials::CredentialResolver;
use crate::error::TransferError;
use crate::proxy::{ProxyProperties, ProxyProperty, ProxySnapshot};
use crate::repository::{AuthenticationInfo, ProxyInfo, Repository};
use crate::url_builder::build_url;

/// An open connection to a repository.
#[derive(Debug)]
pub(crate) struct Session {
    repository: Repository,
    client: Client,
    credentials: CredentialResolver,
    headers: HeaderMap,
    ambient: ProxyProperties,
    snapshot: ProxySnapshot,
}

impl Session {
    /// Opens a session against `repository`.
    ///
    /// A proxy whose exclusion list matches the repository host is ignored.
    /// On failure the ambient proxy values are restored before returning.
    pub(crate) fn open(
        config: &TransportConfig,
        ambient: &ProxyProperties,
        repository: Repository,
        proxy: Option<&ProxyInfo>,
        auth: Option<&AuthenticationInfo>,
    ) -> Result<Self, TransferError> {
        config.validate().map_err(|e| {
            TransferError::transfer_failed_with("Invalid transport configuration", e)
        })?;
        let headers = header_map(&config.http_headers)?;

        let snapshot = ambient.snapshot();

        let host = repository.host();
        let proxy = proxy.filter(|proxy| {
            let excluded = proxy.is_excluded(&host);
            if excluded {
                debug!(%host, proxy = %proxy.host, "repository host bypasses proxy");
            }
            !excluded
        });

        if let Some(proxy) = proxy {
            ambient.set(ProxyProperty::Host, proxy.host.clone());
            ambient.set(ProxyProperty::Port, proxy.port.to_string());
            if let Some(non_proxy_hosts) = &proxy.non_proxy_hosts {
                ambient.set(ProxyProperty::NonProxyHosts, non_proxy_hosts.clone());
            }
        }

        let credentials = CredentialResolver::new(proxy, auth);

        let client = match build_client(config, ambient, &credentials) {
            Ok(client) => client,
            Err(error) => {
                ambient.restore(&snapshot);
                return Err(TransferError::transfer_failed_with(
                    format!("Unable to open connection to {}", repository.url()),
                    error,
                ));
            }
        };

        info!(
            repository = %repository.url(),
            has_proxy = credentials.has_proxy(),
            has_authentication = credentials.has_authentication(),
            "session opened"
        );

        Ok(Self {
            repository,
            client,
            credentials,
            headers,
            ambient: ambient.clone(),
            snapshot,
        })
    }

    /// Ends the session and restores the ambient proxy values it captured.
    pub(crate) fn close(self) {
        let restored = self.ambient.restore(&self.snapshot);
        info!(
            repository = %self.repository.url(),
            restored = ?restored.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            "session closed"
        );
    }

    pub(crate) fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Configured headers applied to every request.
    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Full URL of a resource path in this repository.
    pub(crate) fn resource_url(&self, path: &str) -> String {
        build_url(self.repository.url(), path)
    }

    /// Starts a request with the credentials that apply to `url`.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let credentials = url
            .host_str()
            .and_then(|host| self.credentials.resolve(host, url.port_or_known_default()))
            .cloned();
        let builder = self.client.request(method, url);
        match credentials {
            Some(creds) => builder.basic_auth(creds.username, Some(creds.password)),
            None => builder,
        }
    }
}
