//! Artifact Transport Library
//!
//! HTTP transport for artifact repositories: fetch, list, check and upload
//! resources addressed by a path under a repository base URL, while a
//! connection session overrides and later restores the ambient proxy
//! configuration.
//!
//! # Architecture
//!
//! - [`transport`] - transfer executor ([`HttpTransport`]) and status classification
//! - [`url_builder`] - resource URL composition
//! - [`listing`] - directory listings from HTML index pages
//! - [`proxy`] - ambient proxy configuration store
//! - [`credentials`] - per-session credential resolution
//! - [`repository`] - repository, resource, proxy and authentication descriptors
//! - [`config`] - transport configuration
//! - [`error`] - transfer error taxonomy

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod listing;
pub mod proxy;
pub mod repository;
mod session;
pub mod transport;
pub mod url_builder;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, TransportConfig};
pub use credentials::{CredentialResolver, Credentials};
pub use error::TransferError;
pub use listing::{HtmlFileListParser, ListingParser};
pub use proxy::{ProxyProperties, ProxyProperty, ProxySnapshot};
pub use repository::{AuthenticationInfo, ProxyInfo, Repository, Resource};
pub use transport::{
    HttpTransport, ResourceStream, UploadStream, classify_head_status, classify_put_status,
};
pub use url_builder::{build_url, directory_path};
