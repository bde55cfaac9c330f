//! Default User-Agent for transport requests.

/// Product token identifying the tool.
const PRODUCT: &str = "artifact-transport";

/// Default User-Agent sent when the config does not override it.
#[must_use]
pub(crate) fn default_transport_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (repository-transfer)")
}
