//! Generic REST blob store client.
//!
//! Talks to any store exposing this resource layout:
//!
//! | Operation        | Request                                           |
//! |------------------|---------------------------------------------------|
//! | metadata         | `GET    {base}/objects/{id}`                      |
//! | range read       | `GET    {base}/objects/{id}/content` + `Range`    |
//! | create           | `POST   {base}/objects?name=..&parent=..` + body  |
//! | copy             | `POST   {base}/objects/{id}/copy` `{"parent":..}` |
//! | trash            | `DELETE {base}/objects/{id}`                      |
//! | list             | `GET    {base}/objects?parent=..`                 |
//!
//! Metadata bodies are JSON [`ObjectMetadata`]. Connections are kept alive
//! and pooled; a semaphore caps concurrent checkouts, and a range stream holds
//! its permit until the stream is dropped.
//!
//! No request waits unbounded on a silent store: metadata calls have a total
//! timeout, range reads a bound on the wait for response headers, and uploads
//! fail once no body bytes have moved for `request_timeout`.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use relaycast_common::{ByteRange, Error, ObjectId, ObjectMetadata, Result};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::{ByteStream, NewObject, ObjectStore};

/// Longest upstream error body quoted in an error message.
const MAX_ERROR_BODY: usize = 256;

/// Connection settings for [`HttpObjectStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreSettings {
    /// Base URL, e.g. `https://blobs.internal/v1`.
    pub base_url: String,
    /// Optional bearer token sent with every request.
    pub token: Option<String>,
    /// Cap on concurrent requests (and idle pooled connections).
    pub max_connections: usize,
    pub connect_timeout: Duration,
    /// Timeout for metadata-style requests. Range reads use it to bound the
    /// wait for response headers and uploads as a stall bound, since their
    /// total duration scales with the payload.
    pub request_timeout: Duration,
    /// How long an idle pooled connection is kept.
    pub idle_timeout: Duration,
}

impl Default for HttpStoreSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".to_string(),
            token: None,
            max_connections: 50,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// [`ObjectStore`] backed by a REST blob service.
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
    permits: Arc<Semaphore>,
}

#[derive(Serialize)]
struct CopyRequest<'a> {
    parent: &'a str,
}

impl HttpObjectStore {
    /// Build a client with a keep-alive pool sized to `max_connections`.
    pub fn new(settings: HttpStoreSettings) -> Result<Self> {
        let max_connections = settings.max_connections.max(1);
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .pool_idle_timeout(settings.idle_timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token,
            request_timeout: settings.request_timeout,
            permits: Arc::new(Semaphore::new(max_connections)),
        })
    }

    /// Number of connection permits currently free.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("object store connection pool is closed".into()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        id: Option<&ObjectId>,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let _permit = self.permit().await?;
        let response = self
            .authorize(self.client.get(self.url(path)))
            .query(query)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response, id).await?;
        response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Malformed object store response: {e}")))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_metadata(&self, id: &ObjectId) -> Result<ObjectMetadata> {
        self.get_json(&format!("/objects/{id}"), Some(id), &[]).await
    }

    async fn open_range_stream(&self, id: &ObjectId, range: ByteRange) -> Result<ByteStream> {
        let permit = self.permit().await?;
        debug!(object_id = %id, range = %range.to_header_value(), "Opening upstream range read");

        let request = self
            .authorize(self.client.get(self.url(&format!("/objects/{id}/content"))))
            .header(RANGE, range.to_header_value())
            .send();
        let response = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| {
                Error::upstream(format!(
                    "Object store sent no response within {:?}",
                    self.request_timeout
                ))
            })?
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {}
            // A whole-object 200 is only acceptable when the whole object was asked for.
            StatusCode::OK => {
                if range.start() != 0 || response.content_length() != Some(range.len()) {
                    return Err(Error::upstream(
                        "object store ignored the range request".to_string(),
                    ));
                }
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                let total = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.rsplit('/').next())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                return Err(Error::range_not_satisfiable(range.to_header_value(), total));
            }
            _ => {
                check_status(response, Some(id)).await?;
                return Err(Error::upstream("unexpected status for range read"));
            }
        }

        let stream = response.bytes_stream().map(move |chunk| {
            // The permit lives exactly as long as the stream.
            let _held = &permit;
            chunk.map_err(std::io::Error::other)
        });
        Ok(Box::pin(stream))
    }

    async fn create(&self, object: &NewObject, source: &Path) -> Result<ObjectMetadata> {
        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| Error::UploadFailed(format!("cannot open {}: {e}", source.display())))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| Error::UploadFailed(format!("cannot stat {}: {e}", source.display())))?
            .len();

        let permit = self.permit().await?;

        let uploaded = Arc::new(AtomicU64::new(0));
        let body = ReaderStream::new(file).inspect({
            let uploaded = uploaded.clone();
            move |chunk| {
                if let Ok(chunk) = chunk {
                    uploaded.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                }
            }
        });

        let request = self
            .authorize(self.client.post(self.url("/objects")))
            .query(&[
                ("name", object.name.as_str()),
                ("parent", object.parent.as_str()),
            ])
            .header(CONTENT_TYPE, object.mime_type.as_str())
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(body))
            .send();
        let response = until_stalled(request, &uploaded, self.request_timeout)
            .await?
            .map_err(|e| Error::UploadFailed(format!("transfer failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(Error::UploadFailed(format!("store answered {status}: {body}")));
        }

        let meta: ObjectMetadata = tokio::time::timeout(self.request_timeout, response.json())
            .await
            .map_err(|_| Error::UploadFailed("store did not finish its create response".into()))?
            .map_err(|e| Error::UploadFailed(format!("malformed create response: {e}")))?;
        drop(permit);

        if meta.size != len {
            warn!(
                object_id = %meta.id,
                expected = len,
                stored = meta.size,
                "Stored object is truncated, trashing it"
            );
            if let Err(e) = self.trash(&meta.id).await {
                warn!(object_id = %meta.id, "Failed to trash truncated object: {}", e);
            }
            return Err(Error::UploadFailed(format!(
                "store kept {} of {} bytes",
                meta.size, len
            )));
        }

        Ok(meta)
    }

    async fn copy(&self, id: &ObjectId, parent: &str) -> Result<ObjectMetadata> {
        let _permit = self.permit().await?;
        let response = self
            .authorize(self.client.post(self.url(&format!("/objects/{id}/copy"))))
            .json(&CopyRequest { parent })
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response, Some(id))
            .await?
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Malformed object store response: {e}")))
    }

    async fn trash(&self, id: &ObjectId) -> Result<()> {
        let _permit = self.permit().await?;
        let response = self
            .authorize(self.client.delete(self.url(&format!("/objects/{id}"))))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response, Some(id)).await?;
        Ok(())
    }

    async fn list(&self, parent: &str, mime_prefix: Option<&str>) -> Result<Vec<ObjectMetadata>> {
        let mut query = vec![("parent", parent)];
        if let Some(prefix) = mime_prefix {
            query.push(("mime_prefix", prefix));
        }
        let objects: Vec<ObjectMetadata> = self.get_json("/objects", None, &query).await?;

        Ok(objects
            .into_iter()
            .filter(|o| mime_prefix.map_or(true, |p| o.mime_type.starts_with(p)))
            .collect())
    }
}

/// Drive `request` until it completes, failing with `UploadFailed` once the
/// `progress` counter has not moved for `stall`.
///
/// Once the body is sent the counter stops, so the wait for response headers
/// is bounded by the same `stall`.
async fn until_stalled<F, T>(request: F, progress: &AtomicU64, stall: Duration) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::pin!(request);
    let check_every = (stall / 4).max(Duration::from_millis(10));
    let mut last_seen = progress.load(Ordering::Relaxed);
    let mut last_change = Instant::now();

    loop {
        tokio::select! {
            output = &mut request => return Ok(output),
            _ = tokio::time::sleep(check_every) => {
                let now = progress.load(Ordering::Relaxed);
                if now != last_seen {
                    last_seen = now;
                    last_change = Instant::now();
                } else if last_change.elapsed() >= stall {
                    warn!(bytes = now, "Upload stalled, giving up");
                    return Err(Error::UploadFailed(format!(
                        "no progress for {stall:?} after {now} bytes"
                    )));
                }
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::upstream(format!("Object store request failed: {e}"))
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(response: Response, id: Option<&ObjectId>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = id {
            return Err(Error::object_not_found(id));
        }
    }
    let body = error_body(response).await;
    Err(Error::upstream(format!("Object store answered {status}: {body}")))
}

async fn error_body(response: Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
