//! HTTP client construction for a transport session.
//!
//! Proxy routing is read from the ambient [`ProxyProperties`] at the moment
//! the session opens, the way a process-wide proxy setting would be picked
//! up by a freshly created connection.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder};
use tracing::debug;

use crate::config::TransportConfig;
use crate::credentials::CredentialResolver;
use crate::error::TransferError;
use crate::proxy::ProxyProperties;
use crate::user_agent;

/// Builds the session client from config, ambient proxy values and the
/// session's credentials.
pub(crate) fn build_client(
    config: &TransportConfig,
    ambient: &ProxyProperties,
    credentials: &CredentialResolver,
) -> Result<Client, reqwest::Error> {
    let mut builder = base_client_builder(config);

    match ambient.to_reqwest_proxy()? {
        Some(mut proxy) => {
            // Repository credentials are never offered to the proxy.
            if credentials.has_proxy()
                && let Some((host, port)) = ambient.proxy_address()
                && let Some(creds) = credentials.resolve(&host, Some(port))
            {
                proxy = proxy.basic_auth(&creds.username, &creds.password);
            }
            debug!(proxy = ?ambient.proxy_address(), "routing session through proxy");
            builder = builder.proxy(proxy);
        }
        None => {
            builder = builder.no_proxy();
        }
    }

    builder.build()
}

fn base_client_builder(config: &TransportConfig) -> ClientBuilder {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(user_agent::default_transport_user_agent);
    Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.read_timeout_secs))
        .user_agent(user_agent)
}

/// Converts configured headers into a header map.
pub(crate) fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransferError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            TransferError::transfer_failed_with(format!("Invalid HTTP header name '{name}'"), e)
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            TransferError::transfer_failed_with(format!("Invalid value for HTTP header '{name}'"), e)
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Overlays `custom` onto `base`, replacing headers that exist in both.
pub(crate) fn overlay_headers(base: &mut HeaderMap, custom: &HeaderMap) {
    for (name, value) in custom {
        base.insert(name.clone(), value.clone());
    }
}

/// Maps a failed request to a transfer failure naming the URL.
pub(crate) fn send_error(url: &str, error: reqwest::Error) -> TransferError {
    if error.is_timeout() {
        TransferError::transfer_failed_with(format!("Timed out transferring file: {url}"), error)
    } else {
        TransferError::transfer_failed_with(format!("Error transferring file: {url}"), error)
    }
}
