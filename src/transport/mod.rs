//! HTTP transfer executor.
//!
//! [`HttpTransport`] fetches, lists, checks and uploads resources of one
//! repository at a time. A connection is bracketed by [`HttpTransport::open`]
//! and [`HttpTransport::close`]; `close` also runs when the transport is
//! dropped while still connected.
//!
//! # Example
//!
//! ```no_run
//! use artifact_transport::{HttpTransport, Repository, Resource, TransportConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut transport = HttpTransport::new(TransportConfig::default());
//! transport.open(Repository::new("central", "https://repo.example.com/maven2"), None, None)?;
//!
//! let mut resource = Resource::new("org/acme/lib/1.0/lib-1.0.pom");
//! let pom = transport.fetch(&mut resource).await?.into_bytes().await?;
//! println!("{} bytes, modified {:?}", pom.len(), resource.last_modified);
//!
//! transport.close();
//! # Ok(())
//! # }
//! ```

mod status;
mod stream;
mod upload;

use std::path::Path;
use std::time::SystemTime;

use reqwest::header::{
    ACCEPT_ENCODING, CONTENT_LENGTH, HeaderMap, HeaderValue, PRAGMA,
};
use reqwest::{Method, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use status::{classify_head_status, classify_put_status};
pub use stream::ResourceStream;
pub use upload::UploadStream;

use crate::client::{overlay_headers, send_error};
use crate::config::TransportConfig;
use crate::error::TransferError;
use crate::listing::{HtmlFileListParser, ListingParser};
use crate::proxy::ProxyProperties;
use crate::repository::{AuthenticationInfo, ProxyInfo, Repository, Resource};
use crate::session::Session;
use crate::url_builder::directory_path;
use stream::{record_metadata, stream_to_file};
use upload::{PendingUpload, UploadSlot};

/// Chunk size used when copying a file into an upload.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// HTTP transport for a single repository connection.
///
/// One instance serves one connection at a time and at most one upload at a
/// time. Use separate instances for concurrent transfers.
pub struct HttpTransport {
    config: TransportConfig,
    ambient: ProxyProperties,
    listing_parser: Box<dyn ListingParser>,
    session: Option<Session>,
    upload: UploadSlot,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("upload", &self.upload)
            .finish_non_exhaustive()
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl HttpTransport {
    /// Creates a disconnected transport using the process-wide proxy store
    /// and the HTML listing parser.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            ambient: ProxyProperties::system(),
            listing_parser: Box::new(HtmlFileListParser),
            session: None,
            upload: UploadSlot::Idle,
        }
    }

    /// Uses `ambient` as the proxy store instead of the process-wide one.
    #[must_use]
    pub fn with_proxy_properties(mut self, ambient: ProxyProperties) -> Self {
        self.ambient = ambient;
        self
    }

    /// Replaces the directory listing parser.
    #[must_use]
    pub fn with_listing_parser(mut self, parser: impl ListingParser + 'static) -> Self {
        self.listing_parser = Box::new(parser);
        self
    }

    /// Transport configuration.
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// True between a successful `open` and `close`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// True while an upload is opened and not yet committed.
    #[must_use]
    pub fn has_pending_upload(&self) -> bool {
        self.upload.is_open()
    }

    /// Repository of the open session.
    #[must_use]
    pub fn repository(&self) -> Option<&Repository> {
        self.session.as_ref().map(Session::repository)
    }

    /// Opens a connection to `repository`.
    ///
    /// The ambient proxy values are captured and, when `proxy` applies to the
    /// repository host, overridden for the life of the connection. An already
    /// open connection is closed first.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::TransferFailed`] when the configuration is
    /// invalid or the HTTP client cannot be built.
    #[instrument(skip(self, repository, proxy, auth), fields(repository = %repository.url()))]
    pub fn open(
        &mut self,
        repository: Repository,
        proxy: Option<ProxyInfo>,
        auth: Option<AuthenticationInfo>,
    ) -> Result<(), TransferError> {
        if self.session.is_some() {
            debug!("closing previous session before reopening");
            self.close();
        }
        let session = Session::open(
            &self.config,
            &self.ambient,
            repository,
            proxy.as_ref(),
            auth.as_ref(),
        )?;
        self.session = Some(session);
        self.upload = UploadSlot::Idle;
        Ok(())
    }

    /// Closes the connection.
    ///
    /// An uncommitted upload is aborted, and the ambient proxy values that
    /// were set before `open` are written back. Values that were unset
    /// before `open` keep whatever the session put there. Never fails.
    pub fn close(&mut self) {
        if let Some(pending) = self.upload.take_pending() {
            pending.abort();
        }
        self.upload = UploadSlot::Closed;
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    fn session(&self) -> Result<&Session, TransferError> {
        self.session
            .as_ref()
            .ok_or_else(|| TransferError::transfer_failed("Transport is not connected"))
    }

    /// Fetches a resource.
    ///
    /// `resource` receives the server's last-modified time and content
    /// length. The returned stream reads the body from the connection as
    /// it is consumed; a gzip-encoded body is decompressed transparently.
    ///
    /// # Errors
    ///
    /// - malformed URL, 404 or 410 → [`TransferError::ResourceDoesNotExist`]
    /// - any other failure → [`TransferError::TransferFailed`]
    #[instrument(skip(self, resource), fields(resource = %resource.name()))]
    pub async fn fetch(&self, resource: &mut Resource) -> Result<ResourceStream, TransferError> {
        let url = self.session()?.resource_url(resource.name());
        Ok(self
            .open_input(resource)
            .await?
            .unwrap_or_else(|| ResourceStream::empty(&url)))
    }

    /// Sends the GET for `resource` and returns the body of the successful
    /// response, or `None` when the server answered without content.
    async fn open_input(&self, resource: &mut Resource) -> Result<Option<ResourceStream>, TransferError> {
        let session = self.session()?;
        let url = session.resource_url(resource.name());
        let parsed = Url::parse(&url).map_err(|e| {
            TransferError::resource_does_not_exist_with(format!("Invalid repository URL: {url}"), e)
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        if !self.config.use_cache {
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        overlay_headers(&mut headers, session.headers());

        debug!(%url, "GET");
        let response = session
            .request(Method::GET, parsed)
            .headers(headers)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;

        let status = response.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Err(TransferError::resource_does_not_exist(format!(
                "Unable to locate resource in repository: {url}"
            )));
        }
        if !status.is_success() {
            return Err(TransferError::transfer_failed(format!(
                "Failed to transfer file: {url}. Return code is: {}",
                status.as_u16()
            )));
        }

        record_metadata(resource, &response);
        if status == StatusCode::NO_CONTENT {
            debug!(%url, "no content returned");
            return Ok(None);
        }
        Ok(Some(ResourceStream::from_response(&url, response)))
    }

    /// Starts uploading `resource` and returns the stream to write its bytes
    /// into. Finish with [`commit_upload`](Self::commit_upload).
    ///
    /// When `resource.content_length` is known it is sent as
    /// `Content-Length`; otherwise the body is sent chunked.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::TransferFailed`] when not connected, when an
    /// upload is already open, or when the URL is malformed.
    #[instrument(skip(self, resource), fields(resource = %resource.name()))]
    pub async fn open_upload(&mut self, resource: &Resource) -> Result<&mut UploadStream, TransferError> {
        let session = self.session()?;
        let url = session.resource_url(resource.name());
        if self.upload.is_open() {
            return Err(TransferError::transfer_failed(format!(
                "Cannot upload {url}: another upload is still open"
            )));
        }
        let parsed = Url::parse(&url).map_err(|e| {
            TransferError::transfer_failed_with(format!("Error transferring file: {url}"), e)
        })?;

        let mut headers = session.headers().clone();
        if let Some(length) = resource.content_length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        }
        let request = session.request(Method::PUT, parsed).headers(headers);

        self.upload = UploadSlot::UploadOpen(PendingUpload::start(url, request));
        match &mut self.upload {
            UploadSlot::UploadOpen(pending) => Ok(pending.stream_mut()),
            _ => Err(TransferError::transfer_failed("Upload could not be started")),
        }
    }

    /// Finishes the open upload and classifies the server's answer.
    ///
    /// `resource_name` names the uploaded resource in error messages.
    ///
    /// # Errors
    ///
    /// - 403 → [`TransferError::AuthorizationDenied`]
    /// - 404 → [`TransferError::ResourceDoesNotExist`]
    /// - other non-success status, IO failure, or no open upload →
    ///   [`TransferError::TransferFailed`]
    #[instrument(skip(self))]
    pub async fn commit_upload(&mut self, resource_name: &str) -> Result<(), TransferError> {
        let url = self.session()?.resource_url(Resource::new(resource_name).name());
        let Some(pending) = self.upload.take_pending() else {
            return Err(TransferError::transfer_failed(format!(
                "No open upload to commit for {url}"
            )));
        };
        let status = pending.finish().await?;
        classify_put_status(status.as_u16(), &url)?;
        info!(%url, status = status.as_u16(), "upload complete");
        Ok(())
    }

    fn discard_upload(&mut self) {
        if let Some(pending) = self.upload.take_pending() {
            pending.abort();
        }
    }

    /// Checks whether a resource exists with a HEAD request.
    ///
    /// # Errors
    ///
    /// - 403 → [`TransferError::AuthorizationDenied`]
    /// - IO failure → [`TransferError::TransferFailed`]
    #[instrument(skip(self))]
    pub async fn exists(&self, resource_name: &str) -> Result<bool, TransferError> {
        let session = self.session()?;
        let url = session.resource_url(Resource::new(resource_name).name());
        let parsed = Url::parse(&url).map_err(|e| {
            TransferError::transfer_failed_with(format!("Error transferring file: {url}"), e)
        })?;

        // HEAD always carries an explicit empty body.
        let response = session
            .request(Method::HEAD, parsed)
            .headers(session.headers().clone())
            .body(Vec::new())
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;

        let status = response.status().as_u16();
        debug!(%url, status, "HEAD");
        classify_head_status(status, &url)
    }

    /// Lists the entries of a directory from its HTML index page.
    ///
    /// `directory` gets a trailing `/` when missing.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`fetch`](Self::fetch), plus
    /// [`TransferError::TransferFailed`] when the server returned no body or
    /// the listing parser fails.
    #[instrument(skip(self))]
    pub async fn list_files(&self, directory: &str) -> Result<Vec<String>, TransferError> {
        let directory = directory_path(directory);
        let url = self.session()?.resource_url(&directory);
        let mut resource = Resource::new(directory);

        let Some(body) = self.open_input(&mut resource).await? else {
            return Err(TransferError::transfer_failed(format!(
                "{url} - Could not open input stream for resource: '{resource}'"
            )));
        };
        let index = body.into_bytes().await?;
        self.listing_parser.parse_file_list(&url, &mut index.as_slice())
    }

    /// Downloads a resource into `destination`, creating parent directories.
    ///
    /// A partially written file is removed when the transfer fails.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`fetch`](Self::fetch), plus
    /// [`TransferError::TransferFailed`] for local file errors.
    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    pub async fn get(&self, resource_name: &str, destination: &Path) -> Result<Resource, TransferError> {
        let mut resource = Resource::new(resource_name);
        let body = self.open_input(&mut resource).await?;
        self.write_destination(&resource, body, destination).await?;
        Ok(resource)
    }

    /// Downloads a resource only when it is newer than `timestamp`.
    ///
    /// The transfer happens when `timestamp` is `None`, when the server does
    /// not report a last-modified time, or when that time is later than
    /// `timestamp`. Returns whether `destination` was written.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    pub async fn get_if_newer(
        &self,
        resource_name: &str,
        destination: &Path,
        timestamp: Option<SystemTime>,
    ) -> Result<bool, TransferError> {
        let mut resource = Resource::new(resource_name);
        let body = self.open_input(&mut resource).await?;

        let newer = match (timestamp, resource.last_modified) {
            (Some(local), Some(remote)) => remote > local,
            _ => true,
        };
        if !newer {
            debug!(resource = %resource, "remote copy is not newer, skipping transfer");
            return Ok(false);
        }

        self.write_destination(&resource, body, destination).await?;
        Ok(true)
    }

    async fn write_destination(
        &self,
        resource: &Resource,
        body: Option<ResourceStream>,
        destination: &Path,
    ) -> Result<(), TransferError> {
        let url = self.session()?.resource_url(resource.name());
        let io_error = |e: std::io::Error| {
            TransferError::transfer_failed_with(
                format!("Error writing {} from {url}", destination.display()),
                e,
            )
        };

        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let file = File::create(destination).await.map_err(io_error)?;

        let Some(body) = body else {
            info!(%url, path = %destination.display(), bytes = 0, "download complete");
            return Ok(());
        };

        match stream_to_file(file, body, destination).await {
            Ok(bytes) => {
                info!(%url, path = %destination.display(), bytes, "download complete");
                Ok(())
            }
            Err(error) => {
                debug!(path = %destination.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(destination).await;
                Err(error)
            }
        }
    }

    /// Uploads the file at `source` as `resource_name`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`open_upload`](Self::open_upload) and
    /// [`commit_upload`](Self::commit_upload), plus
    /// [`TransferError::TransferFailed`] when `source` cannot be read.
    #[instrument(skip(self, source), fields(source = %source.display()))]
    pub async fn put(&mut self, source: &Path, resource_name: &str) -> Result<(), TransferError> {
        let io_error = |e: std::io::Error| {
            TransferError::transfer_failed_with(format!("Error reading {}", source.display()), e)
        };
        let metadata = tokio::fs::metadata(source).await.map_err(io_error)?;
        let mut file = File::open(source).await.map_err(io_error)?;

        let mut resource = Resource::new(resource_name);
        resource.content_length = Some(metadata.len());
        resource.last_modified = metadata.modified().ok();

        let upload = self.open_upload(&resource).await?;
        let copied = copy_into(&mut file, upload, source).await;
        match copied {
            Ok(bytes) => debug!(bytes, "upload body written"),
            Err(CopyError::Source(error)) => {
                self.discard_upload();
                return Err(error);
            }
            Err(CopyError::Upload(error)) => return Err(self.rejected_upload(&resource, error).await),
        }
        self.commit_upload(resource.name()).await
    }

    /// Collects the answer of an upload whose connection closed before the
    /// body was fully sent. A server that rejected the upload early reports
    /// its status here; `write_error` is returned when there is none.
    async fn rejected_upload(&mut self, resource: &Resource, write_error: TransferError) -> TransferError {
        let Some(pending) = self.upload.take_pending() else {
            return write_error;
        };
        let url = match self.session() {
            Ok(session) => session.resource_url(resource.name()),
            Err(_) => return write_error,
        };
        match pending.finish().await {
            Ok(status) => {
                warn!(%url, status = status.as_u16(), "server answered before the upload body was sent");
                classify_put_status(status.as_u16(), &url).err().unwrap_or(write_error)
            }
            Err(finish_error) => {
                debug!(%url, error = %finish_error, "no response for interrupted upload");
                write_error
            }
        }
    }
}

/// Which side of [`copy_into`] failed.
enum CopyError {
    Source(TransferError),
    Upload(TransferError),
}

async fn copy_into(file: &mut File, upload: &mut UploadStream, source: &Path) -> Result<u64, CopyError> {
    let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer).await.map_err(|e| {
            CopyError::Source(TransferError::transfer_failed_with(
                format!("Error reading {}", source.display()),
                e,
            ))
        })?;
        if read == 0 {
            return Ok(upload.bytes_written());
        }
        upload
            .write_all(&buffer[..read])
            .await
            .map_err(CopyError::Upload)?;
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("transport dropped while connected, closing session");
            self.close();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::proxy::ProxyProperty;

    fn transport() -> HttpTransport {
        HttpTransport::new(TransportConfig::default())
            .with_proxy_properties(ProxyProperties::isolated())
    }

    #[tokio::test]
    async fn test_operations_require_open_connection() {
        let mut transport = transport();
        let mut resource = Resource::new("a.jar");

        let err = transport.fetch(&mut resource).await.unwrap_err();
        assert!(err.message().contains("not connected"));
        assert!(transport.exists("a.jar").await.is_err());
        assert!(transport.list_files("dir").await.is_err());
        assert!(transport.open_upload(&resource).await.is_err());
        assert!(transport.commit_upload("a.jar").await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_repository_url_on_fetch_is_missing_resource() {
        let mut transport = transport();
        transport
            .open(Repository::new("bad", "not a url"), None, None)
            .unwrap();

        let err = transport
            .fetch(&mut Resource::new("a.jar"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ResourceDoesNotExist { .. }), "got: {err:?}");
        assert!(err.message().contains("Invalid repository URL"));

        let err = transport.exists("a.jar").await.unwrap_err();
        assert!(matches!(err, TransferError::TransferFailed { .. }));
    }

    #[tokio::test]
    async fn test_commit_without_open_upload_fails() {
        let mut transport = transport();
        transport
            .open(Repository::new("r", "http://127.0.0.1:9/repo"), None, None)
            .unwrap();
        let err = transport.commit_upload("a.jar").await.unwrap_err();
        assert!(matches!(err, TransferError::TransferFailed { .. }));
        assert!(err.message().contains("No open upload"));
    }

    #[test]
    fn test_drop_restores_ambient_values() {
        let ambient = ProxyProperties::isolated();
        ambient.set(ProxyProperty::Host, "before");
        {
            let mut transport = HttpTransport::new(TransportConfig::default())
                .with_proxy_properties(ambient.clone());
            transport
                .open(
                    Repository::new("r", "http://repo.example.com/"),
                    Some(ProxyInfo::new("during", 3128)),
                    None,
                )
                .unwrap();
            assert_eq!(ambient.get(ProxyProperty::Host).as_deref(), Some("during"));
        }
        assert_eq!(ambient.get(ProxyProperty::Host).as_deref(), Some("before"));
    }

    #[test]
    fn test_reopen_closes_previous_session_first() {
        let ambient = ProxyProperties::isolated();
        ambient.set(ProxyProperty::Port, "8080");
        let mut transport = HttpTransport::new(TransportConfig::default())
            .with_proxy_properties(ambient.clone());

        let repository = Repository::new("r", "http://repo.example.com/");
        transport
            .open(repository.clone(), Some(ProxyInfo::new("p1", 3128)), None)
            .unwrap();
        transport
            .open(repository, Some(ProxyInfo::new("p2", 3129)), None)
            .unwrap();
        assert_eq!(ambient.get(ProxyProperty::Port).as_deref(), Some("3129"));

        transport.close();
        // The second snapshot was taken after the first session was restored.
        assert_eq!(ambient.get(ProxyProperty::Port).as_deref(), Some("8080"));
    }
}
