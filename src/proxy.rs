//! Ambient proxy configuration.
//!
//! The transport reads proxy routing from a shared key/value store rather
//! than from its own fields, so that a session can override whatever the
//! process had configured and hand it back afterwards.
//!
//! [`ProxyProperties::system`] is process-wide. Two sessions opened against
//! it at the same time overwrite each other's values; use one session at a
//! time, or give each transport its own [`ProxyProperties::isolated`] store.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use reqwest::{NoProxy, Proxy};
use tracing::debug;

use crate::repository::non_proxy_patterns;

/// Default proxy port when the ambient port is unset or unparseable.
pub const DEFAULT_PROXY_PORT: u16 = 80;

/// The ambient values a session may override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProxyProperty {
    /// Proxy host name.
    Host,
    /// Proxy port, stored as a decimal string.
    Port,
    /// Hosts bypassing the proxy.
    NonProxyHosts,
}

impl ProxyProperty {
    /// All properties, in snapshot order.
    pub const ALL: [Self; 3] = [Self::Host, Self::Port, Self::NonProxyHosts];

    /// Stable key used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "http.proxy_host",
            Self::Port => "http.proxy_port",
            Self::NonProxyHosts => "http.non_proxy_hosts",
        }
    }
}

type PropertyMap = BTreeMap<ProxyProperty, String>;

static SYSTEM_PROPERTIES: LazyLock<Arc<RwLock<PropertyMap>>> =
    LazyLock::new(|| Arc::new(RwLock::new(PropertyMap::new())));

/// Shared handle to an ambient proxy configuration store.
#[derive(Debug, Clone)]
pub struct ProxyProperties {
    values: Arc<RwLock<PropertyMap>>,
}

impl Default for ProxyProperties {
    fn default() -> Self {
        Self::system()
    }
}

impl ProxyProperties {
    /// The process-wide store.
    #[must_use]
    pub fn system() -> Self {
        Self {
            values: Arc::clone(&SYSTEM_PROPERTIES),
        }
    }

    /// A fresh, empty store private to the caller and its clones.
    #[must_use]
    pub fn isolated() -> Self {
        Self {
            values: Arc::new(RwLock::new(PropertyMap::new())),
        }
    }

    /// Reads a property.
    #[must_use]
    pub fn get(&self, property: ProxyProperty) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&property)
            .cloned()
    }

    /// Sets a property.
    pub fn set(&self, property: ProxyProperty, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(property, value.into());
    }

    /// Captures the current values of all properties.
    #[must_use]
    pub fn snapshot(&self) -> ProxySnapshot {
        ProxySnapshot {
            host: self.get(ProxyProperty::Host),
            port: self.get(ProxyProperty::Port),
            non_proxy_hosts: self.get(ProxyProperty::NonProxyHosts),
        }
    }

    /// Writes back the values present in `snapshot`.
    ///
    /// Properties that were unset when the snapshot was taken are left alone,
    /// so a value written by a session over an empty slot survives the
    /// restore. Returns the properties that were written.
    pub fn restore(&self, snapshot: &ProxySnapshot) -> Vec<ProxyProperty> {
        let mut restored = Vec::new();
        for property in ProxyProperty::ALL {
            if let Some(value) = snapshot.get(property) {
                self.set(property, value);
                restored.push(property);
            }
        }
        restored
    }

    /// Builds a `reqwest` proxy from the current values.
    ///
    /// Returns `Ok(None)` when no proxy host is configured.
    pub(crate) fn to_reqwest_proxy(&self) -> Result<Option<Proxy>, reqwest::Error> {
        let Some(host) = self.get(ProxyProperty::Host).filter(|h| !h.is_empty()) else {
            return Ok(None);
        };
        let port = self.proxy_port();
        let proxy = Proxy::http(format!("http://{host}:{port}"))?;
        let no_proxy = self
            .get(ProxyProperty::NonProxyHosts)
            .and_then(|list| NoProxy::from_string(&to_no_proxy_list(&list)));
        Ok(Some(proxy.no_proxy(no_proxy)))
    }

    /// The configured proxy host and port, if a host is set.
    #[must_use]
    pub fn proxy_address(&self) -> Option<(String, u16)> {
        self.get(ProxyProperty::Host)
            .filter(|h| !h.is_empty())
            .map(|host| (host, self.proxy_port()))
    }

    fn proxy_port(&self) -> u16 {
        self.get(ProxyProperty::Port)
            .and_then(|port| port.trim().parse().ok())
            .unwrap_or(DEFAULT_PROXY_PORT)
    }
}

/// Proxy values captured before a session overrides them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySnapshot {
    /// Proxy host at snapshot time.
    pub host: Option<String>,
    /// Proxy port at snapshot time.
    pub port: Option<String>,
    /// Non-proxy host list at snapshot time.
    pub non_proxy_hosts: Option<String>,
}

impl ProxySnapshot {
    fn get(&self, property: ProxyProperty) -> Option<&str> {
        match property {
            ProxyProperty::Host => self.host.as_deref(),
            ProxyProperty::Port => self.port.as_deref(),
            ProxyProperty::NonProxyHosts => self.non_proxy_hosts.as_deref(),
        }
    }
}

/// Converts a `|`-separated wildcard list into the comma-separated form
/// `reqwest` understands: domain suffixes, plain hosts and IP networks.
///
/// `10.0.*` becomes `10.0.0.0/16`. Wildcards with no such equivalent are
/// dropped.
fn to_no_proxy_list(list: &str) -> String {
    non_proxy_patterns(list)
        .filter_map(|pattern| {
            let converted = match pattern.strip_prefix("*.") {
                Some(suffix) => format!(".{suffix}"),
                None if pattern == "*" => return Some(pattern.to_string()),
                None => match ipv4_prefix_network(pattern) {
                    Some(network) => network,
                    None => pattern.trim_start_matches('*').to_string(),
                },
            };
            if converted.contains('*') || converted.is_empty() {
                debug!(pattern, "non-proxy pattern has no reqwest equivalent; ignored");
                return None;
            }
            Some(converted)
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// `a.*`, `a.b.*` or `a.b.c.*` as an IPv4 network in CIDR notation.
fn ipv4_prefix_network(pattern: &str) -> Option<String> {
    let prefix = pattern.strip_suffix(".*")?;
    let octets = prefix
        .split('.')
        .map(|octet| octet.parse::<u8>().ok())
        .collect::<Option<Vec<_>>>()?;
    if octets.is_empty() || octets.len() > 3 {
        return None;
    }
    let mut address = [0u8; 4];
    address[..octets.len()].copy_from_slice(&octets);
    let [a, b, c, d] = address;
    Some(format!("{a}.{b}.{c}.{d}/{}", octets.len() * 8))
}
