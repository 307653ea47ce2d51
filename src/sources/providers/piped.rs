//! Piped-compatible catalogue provider.
//!
//! Implements [`SourceProvider`] against one instance of the Piped JSON API:
//!
//! - `GET {base}/search?q={query}&filter=music_songs`
//! - `GET {base}/streams/{video_id}`
//!
//! Instances behind bot walls answer with HTML; anything that is not a
//! successful JSON body is treated as a failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::sources::provider::{AudioStream, SearchHit, SourceProvider};

// ---------------------------------------------------------------------------
// API response types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamsResponse {
    #[serde(default)]
    audio_streams: Vec<PipedAudioStream>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipedAudioStream {
    url: String,
    #[serde(default)]
    codec: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    bitrate: Option<u64>,
}

// ---------------------------------------------------------------------------
// Provider implementation
// ---------------------------------------------------------------------------

/// One Piped API instance.
pub struct PipedProvider {
    client: reqwest::Client,
    base_url: String,
}

impl PipedProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("{url} answered {status}");
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        if !is_json {
            anyhow::bail!("{url} did not answer with JSON");
        }

        response
            .json()
            .await
            .with_context(|| format!("malformed response from {url}"))
    }
}

/// Extract the video id from a Piped item URL (`/watch?v={id}`).
fn video_id(url: &str) -> Option<&str> {
    let query = url.split_once('?')?.1;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("v="))
        .filter(|id| !id.is_empty())
}

#[async_trait]
impl SourceProvider for PipedProvider {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let response: SearchResponse = self
            .get_json("/search", &[("q", query), ("filter", "music_songs")])
            .await?;

        let hits: Vec<SearchHit> = response
            .items
            .into_iter()
            .filter(|item| item.kind.as_deref().map_or(true, |k| k == "stream"))
            .filter_map(|item| {
                let id = video_id(&item.url)?.to_string();
                Some(SearchHit {
                    title: item.title.unwrap_or_else(|| id.clone()),
                    id,
                    duration_secs: item.duration.and_then(|d| u64::try_from(d).ok()),
                })
            })
            .collect();

        debug!(instance = %self.base_url, hits = hits.len(), "Piped search finished");
        Ok(hits)
    }

    async fn audio_streams(&self, hit: &SearchHit) -> Result<Vec<AudioStream>> {
        let response: StreamsResponse = self
            .get_json(&format!("/streams/{}", hit.id), &[])
            .await?;

        Ok(response
            .audio_streams
            .into_iter()
            .map(|s| AudioStream {
                url: s.url,
                codec: s.codec.unwrap_or_default(),
                mime_type: s.mime_type.unwrap_or_default(),
                bitrate: s.bitrate.unwrap_or(0),
            })
            .collect())
    }
}
