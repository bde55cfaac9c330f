//! Response bodies: streamed resource bodies and streaming to disk.

use std::io::Write;
use std::path::Path;

use bytes::Bytes;
use flate2::write::GzDecoder;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::Response;
use reqwest::header::{CONTENT_ENCODING, CONTENT_LENGTH, LAST_MODIFIED};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::client::send_error;
use crate::error::TransferError;
use crate::repository::Resource;

type ChunkStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// Body of a fetched resource, read chunk by chunk from the connection.
///
/// A gzip-encoded body is decompressed as it arrives; only the current chunk
/// is held in memory.
pub struct ResourceStream {
    url: String,
    chunks: ChunkStream,
    decoder: Option<GzDecoder<Vec<u8>>>,
    finished: bool,
}

impl std::fmt::Debug for ResourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStream")
            .field("url", &self.url)
            .field("gzipped", &self.decoder.is_some())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ResourceStream {
    /// Wraps the live body of `response`.
    pub(crate) fn from_response(url: &str, response: Response) -> Self {
        let gzipped = is_gzipped(&response);
        let error_url = url.to_string();
        let chunks = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| send_error(&error_url, e)));
        Self::from_chunks(url, chunks, gzipped)
    }

    pub(crate) fn from_chunks(
        url: &str,
        chunks: impl Stream<Item = Result<Bytes, TransferError>> + Send + 'static,
        gzipped: bool,
    ) -> Self {
        Self {
            url: url.to_string(),
            chunks: chunks.boxed(),
            decoder: gzipped.then(|| GzDecoder::new(Vec::new())),
            finished: false,
        }
    }

    /// A body without content.
    pub(crate) fn empty(url: &str) -> Self {
        Self::from_chunks(url, stream::empty(), false)
    }

    /// URL the body is read from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Reads the next decoded chunk, or `None` at the end of the body.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::TransferFailed`] when the connection fails
    /// or the gzip data is corrupt.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransferError> {
        while !self.finished {
            let Some(chunk) = self.chunks.next().await else {
                self.finished = true;
                if let Some(decoder) = self.decoder.take() {
                    let tail = decoder.finish().map_err(|e| self.decode_error(e))?;
                    if !tail.is_empty() {
                        return Ok(Some(Bytes::from(tail)));
                    }
                }
                break;
            };
            let chunk = chunk?;
            let decoded = match self.decoder.as_mut() {
                Some(decoder) => match decoder.write_all(&chunk) {
                    Ok(()) => Bytes::from(std::mem::take(decoder.get_mut())),
                    Err(e) => return Err(self.decode_error(e)),
                },
                None => chunk,
            };
            if !decoded.is_empty() {
                return Ok(Some(decoded));
            }
        }
        Ok(None)
    }

    /// Reads the rest of the body into memory.
    ///
    /// # Errors
    ///
    /// Same as [`next_chunk`](Self::next_chunk).
    pub async fn into_bytes(mut self) -> Result<Vec<u8>, TransferError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    fn decode_error(&self, error: std::io::Error) -> TransferError {
        TransferError::transfer_failed_with(
            format!("Error decoding gzip body of {}", self.url),
            error,
        )
    }
}

/// True when the response body is gzip-encoded.
pub(crate) fn is_gzipped(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"))
}

/// Copies `Last-Modified` and `Content-Length` from the response.
pub(crate) fn record_metadata(resource: &mut Resource, response: &Response) {
    let headers = response.headers();
    resource.last_modified = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok());
    resource.content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
}

/// Streams `body` into `file`, returning decoded bytes written.
pub(crate) async fn stream_to_file(
    file: File,
    mut body: ResourceStream,
    path: &Path,
) -> Result<u64, TransferError> {
    let url = body.url().to_owned();
    let io_error = |e: std::io::Error| {
        TransferError::transfer_failed_with(
            format!("Error writing {} from {}", path.display(), url),
            e,
        )
    };

    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;
    loop {
        let Some(chunk) = body.next_chunk().await? else {
            break;
        };
        writer.write_all(&chunk).await.map_err(io_error)?;
        bytes_written += chunk.len() as u64;
    }
    writer.flush().await.map_err(io_error)?;
    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    const URL: &str = "http://host/repo/a.bin";

    fn chunked(data: &[u8], size: usize) -> Vec<Result<Bytes, TransferError>> {
        data.chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_plain_chunks_pass_through_one_by_one() {
        let mut body = ResourceStream::from_chunks(
            URL,
            stream::iter(chunked(b"plain bytes", 4)),
            false,
        );
        assert_eq!(body.next_chunk().await.unwrap().unwrap(), "plai");
        assert_eq!(body.next_chunk().await.unwrap().unwrap(), "n by");
        assert_eq!(body.next_chunk().await.unwrap().unwrap(), "tes");
        assert!(body.next_chunk().await.unwrap().is_none());
        assert!(body.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gzipped_chunks_are_decoded_incrementally() {
        let payload = b"compressed payload ".repeat(500);
        let body = ResourceStream::from_chunks(
            URL,
            stream::iter(chunked(&gzip(&payload), 7)),
            true,
        );
        assert_eq!(body.into_bytes().await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_corrupt_gzip_is_transfer_failure() {
        let body = ResourceStream::from_chunks(
            URL,
            stream::iter(chunked(b"not gzip at all", 5)),
            true,
        );
        let err = body.into_bytes().await.unwrap_err();
        assert!(matches!(err, TransferError::TransferFailed { .. }));
        assert!(err.message().contains(URL));
    }

    #[tokio::test]
    async fn test_connection_error_is_surfaced() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(TransferError::transfer_failed("connection reset")),
        ];
        let mut body = ResourceStream::from_chunks(URL, stream::iter(chunks), false);
        assert_eq!(body.next_chunk().await.unwrap().unwrap(), "partial");
        assert!(body.next_chunk().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_stream() {
        assert!(ResourceStream::empty(URL).into_bytes().await.unwrap().is_empty());
    }
}
