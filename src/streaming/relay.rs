//! Stream relay: pipes a byte range of a remote object to a client.
//!
//! Metadata is fetched fresh for every request, the `Range` header is
//! validated against it, and only then is an upstream read opened. The
//! upstream stream is owned by the response body, so a client disconnect
//! drops the body and with it the upstream read.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use relaycast_common::{ByteRange, ObjectId, ObjectMetadata, Result};
use relaycast_store::{ByteStream, ObjectStore};
use tracing::{debug, info, warn};

use super::range::{translate, RangeRequest};

/// Relays byte ranges of objects from the backing store.
#[derive(Clone)]
pub struct StreamRelay {
    store: Arc<dyn ObjectStore>,
}

impl StreamRelay {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Build the response for `GET /stream/{id}`.
    ///
    /// Every error is returned before any body byte is produced, so the caller
    /// can still answer with a proper status code.
    pub async fn relay(&self, id: &ObjectId, range_header: Option<&str>) -> Result<Response> {
        let meta = self.store.fetch_metadata(id).await?;
        let request = translate(range_header, meta.size)?;
        let content_type = playback_content_type(&meta.mime_type);

        match request {
            RangeRequest::Partial(range) => {
                let body = self.open_body(&meta, range).await?;
                debug!(object_id = %id, range = %range.to_header_value(), "Relaying partial content");

                Ok((
                    StatusCode::PARTIAL_CONTENT,
                    [
                        (header::CONTENT_TYPE.as_str(), content_type),
                        (header::CONTENT_RANGE.as_str(), range.content_range(meta.size)),
                        (header::CONTENT_LENGTH.as_str(), range.len().to_string()),
                        (header::ACCEPT_RANGES.as_str(), "bytes".to_string()),
                    ],
                    body,
                )
                    .into_response())
            }
            RangeRequest::Full => {
                let body = match ByteRange::full(meta.size) {
                    Some(range) => self.open_body(&meta, range).await?,
                    // Nothing to read for an empty object.
                    None => Body::empty(),
                };
                debug!(object_id = %id, bytes = meta.size, "Relaying full object");

                Ok((
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE.as_str(), content_type),
                        (header::CONTENT_LENGTH.as_str(), meta.size.to_string()),
                        (header::ACCEPT_RANGES.as_str(), "bytes".to_string()),
                    ],
                    body,
                )
                    .into_response())
            }
        }
    }

    async fn open_body(&self, meta: &ObjectMetadata, range: ByteRange) -> Result<Body> {
        let upstream = self.store.open_range_stream(&meta.id, range).await?;
        Ok(Body::from_stream(RelayStream::new(
            upstream,
            range.len(),
            meta.id.clone(),
        )))
    }
}

/// Content type announced to players.
///
/// Matroska is announced as its closest browser-playable relative; the bytes
/// themselves are never re-encoded.
pub fn playback_content_type(mime: &str) -> String {
    let mime = mime.trim().to_ascii_lowercase();
    match mime.as_str() {
        "video/x-matroska" => "video/mp4".to_string(),
        "audio/x-matroska" => "audio/webm".to_string(),
        "audio/mp3" => "audio/mpeg".to_string(),
        "" => "application/octet-stream".to_string(),
        _ => mime,
    }
}

/// Upstream byte stream bounded to the announced `Content-Length`.
///
/// Surplus upstream bytes are cut off. An upstream that ends early yields an
/// error so the connection is aborted instead of hanging short.
pub struct RelayStream {
    upstream: ByteStream,
    remaining: u64,
    sent: u64,
    object_id: ObjectId,
    finished: bool,
}

impl RelayStream {
    pub fn new(upstream: ByteStream, length: u64, object_id: ObjectId) -> Self {
        Self {
            upstream,
            remaining: length,
            sent: 0,
            object_id,
            finished: false,
        }
    }

    /// Bytes handed to the client so far.
    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }
}

impl Stream for RelayStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.remaining == 0 {
            this.finished = true;
            return Poll::Ready(None);
        }

        match this.upstream.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(mut chunk))) => {
                if chunk.len() as u64 > this.remaining {
                    chunk.truncate(this.remaining as usize);
                }
                this.remaining -= chunk.len() as u64;
                this.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                warn!(object_id = %this.object_id, bytes = this.sent, "Upstream read failed: {}", e);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                warn!(
                    object_id = %this.object_id,
                    bytes = this.sent,
                    missing = this.remaining,
                    "Upstream ended before the announced length"
                );
                Poll::Ready(Some(Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "upstream ended early",
                ))))
            }
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        if self.finished {
            debug!(object_id = %self.object_id, bytes = self.sent, "Relay finished");
        } else {
            info!(
                object_id = %self.object_id,
                bytes = self.sent,
                "Client went away, upstream read cancelled"
            );
        }
    }
}
