//! Helpers shared by the integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use artifact_transport::{
    AuthenticationInfo, HttpTransport, ProxyInfo, ProxyProperties, Repository, TransportConfig,
};

pub use socket_guard::{should_skip_socket_bound_test, start_mock_server_or_skip};

/// A transport with its own proxy store, connected to `base_url`.
pub fn connected_transport(
    config: TransportConfig,
    base_url: &str,
    proxy: Option<ProxyInfo>,
    auth: Option<AuthenticationInfo>,
) -> HttpTransport {
    let mut transport =
        HttpTransport::new(config).with_proxy_properties(ProxyProperties::isolated());
    transport
        .open(Repository::new("test", base_url), proxy, auth)
        .expect("session should open");
    transport
}
