//! Two-phase uploads.
//!
//! `open_upload` starts a PUT whose body is fed through a channel; the
//! caller writes into the [`UploadStream`], and `commit_upload` ends the body
//! and collects the response status.

use futures_util::stream;
use reqwest::{Body, RequestBuilder, StatusCode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::send_error;
use crate::error::TransferError;

/// Chunks buffered between the writer and the request body.
const UPLOAD_CHANNEL_CAPACITY: usize = 16;

/// Writable side of an in-flight upload.
#[derive(Debug)]
pub struct UploadStream {
    url: String,
    sender: Option<mpsc::Sender<Vec<u8>>>,
    bytes_written: u64,
}

impl UploadStream {
    /// Sends `data` as the next part of the request body.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::TransferFailed`] when the connection has
    /// already gone away. The server's answer, if it sent one before
    /// closing, is still collected by `commit_upload`.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), TransferError> {
        if data.is_empty() {
            return Ok(());
        }
        let Some(sender) = &self.sender else {
            return Err(TransferError::transfer_failed(format!(
                "Upload to {} is already finished",
                self.url
            )));
        };
        sender.send(data.to_vec()).await.map_err(|_| {
            TransferError::transfer_failed(format!(
                "Error transferring file: connection to {} closed",
                self.url
            ))
        })?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// URL the upload is sent to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bytes accepted so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// A started PUT and the writer feeding it.
#[derive(Debug)]
pub(crate) struct PendingUpload {
    stream: UploadStream,
    response: JoinHandle<Result<reqwest::Response, reqwest::Error>>,
}

impl PendingUpload {
    /// Starts sending `request` with a body fed by the returned stream.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start(url: String, request: RequestBuilder) -> Self {
        let (sender, receiver) = mpsc::channel::<Vec<u8>>(UPLOAD_CHANNEL_CAPACITY);
        let chunks = stream::unfold(receiver, |mut receiver| async move {
            receiver
                .recv()
                .await
                .map(|chunk| (Ok::<_, std::io::Error>(chunk), receiver))
        });
        let response = tokio::spawn(request.body(Body::wrap_stream(chunks)).send());
        debug!(%url, "upload started");
        Self {
            stream: UploadStream {
                url,
                sender: Some(sender),
                bytes_written: 0,
            },
            response,
        }
    }

    pub(crate) fn stream_mut(&mut self) -> &mut UploadStream {
        &mut self.stream
    }

    /// Ends the body and waits for the response status.
    pub(crate) async fn finish(mut self) -> Result<StatusCode, TransferError> {
        self.stream.sender.take();
        let url = self.stream.url;
        let bytes = self.stream.bytes_written;
        match self.response.await {
            Ok(Ok(response)) => {
                debug!(%url, bytes, status = response.status().as_u16(), "upload answered");
                Ok(response.status())
            }
            Ok(Err(error)) => Err(send_error(&url, error)),
            Err(join_error) => Err(TransferError::transfer_failed_with(
                format!("Error transferring file: {url}"),
                join_error,
            )),
        }
    }

    /// Drops the connection without waiting for a response.
    pub(crate) fn abort(self) {
        warn!(url = %self.stream.url, "aborting unfinished upload");
        self.response.abort();
    }
}

/// Upload state of a transport.
#[derive(Debug, Default)]
pub(crate) enum UploadSlot {
    /// No upload in progress.
    #[default]
    Idle,
    /// An upload was opened and not yet committed.
    UploadOpen(PendingUpload),
    /// The transport was closed.
    Closed,
}

impl UploadSlot {
    /// Takes the pending upload, leaving the slot idle.
    pub(crate) fn take_pending(&mut self) -> Option<PendingUpload> {
        match std::mem::take(self) {
            Self::UploadOpen(pending) => Some(pending),
            other => {
                *self = other;
                None
            }
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self, Self::UploadOpen(_))
    }
}
