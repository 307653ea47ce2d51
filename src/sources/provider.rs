//! Trait definition and types for audio source providers.
//!
//! A [`SourceProvider`] wraps one external catalogue endpoint and exposes two
//! lookups: a free-text search, and the playable audio streams of a hit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Lookup results
// ---------------------------------------------------------------------------

/// A single result returned from a provider search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Provider-specific identifier used to fetch the hit's streams.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Duration in seconds, if known.
    pub duration_secs: Option<u64>,
}

/// An audio-only stream offered for a hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStream {
    /// Direct URL of the media bytes.
    pub url: String,
    /// Codec string as reported by the provider (e.g. `"opus"`, `"mp4a.40.2"`).
    pub codec: String,
    /// Container MIME type (e.g. `"audio/webm"`).
    pub mime_type: String,
    /// Bits per second, 0 when unknown.
    pub bitrate: u64,
}

/// A playable source chosen for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSource {
    /// Name of the provider that produced the source.
    pub provider: String,
    pub title: String,
    pub stream_url: String,
    pub codec: String,
    pub mime_type: String,
    pub bitrate: u64,
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Async trait that every source provider implements.
///
/// Failures are reported with `anyhow` context; the resolver logs them and
/// moves on to the next provider.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Identifier for logs and success tracking (e.g. the instance URL).
    fn name(&self) -> &str;

    /// Search the catalogue for `query`. Best match first.
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>>;

    /// List the audio-only streams available for `hit`.
    async fn audio_streams(&self, hit: &SearchHit) -> anyhow::Result<Vec<AudioStream>>;
}

/// Pick the best stream by codec preference.
///
/// The first codec family in `preferred` with any match wins, taking its
/// highest-bitrate stream; with no preferred match the first stream is used.
pub fn select_audio_stream<'a>(
    streams: &'a [AudioStream],
    preferred: &[String],
) -> Option<&'a AudioStream> {
    let usable: Vec<&AudioStream> = streams.iter().filter(|s| !s.url.is_empty()).collect();

    for family in preferred {
        let family = family.to_ascii_lowercase();
        let best = usable
            .iter()
            .filter(|s| s.codec.to_ascii_lowercase().starts_with(&family))
            .max_by_key(|s| s.bitrate);
        if let Some(best) = best {
            return Some(*best);
        }
    }

    usable.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(codec: &str, bitrate: u64) -> AudioStream {
        AudioStream {
            url: format!("https://media.example/{codec}/{bitrate}"),
            codec: codec.to_string(),
            mime_type: "audio/webm".to_string(),
            bitrate,
        }
    }

    fn prefs() -> Vec<String> {
        vec!["opus".to_string(), "mp4a".to_string()]
    }

    #[test]
    fn prefers_codec_family_over_bitrate() {
        let streams = vec![stream("mp4a.40.2", 256_000), stream("opus", 64_000)];
        let best = select_audio_stream(&streams, &prefs()).unwrap();
        assert_eq!(best.codec, "opus");
    }

    #[test]
    fn highest_bitrate_within_family() {
        let streams = vec![
            stream("opus", 48_000),
            stream("opus", 160_000),
            stream("opus", 64_000),
        ];
        assert_eq!(select_audio_stream(&streams, &prefs()).unwrap().bitrate, 160_000);
    }

    #[test]
    fn falls_back_to_second_family() {
        let streams = vec![stream("vorbis", 128_000), stream("MP4A.40.5", 48_000)];
        assert_eq!(
            select_audio_stream(&streams, &prefs()).unwrap().codec,
            "MP4A.40.5"
        );
    }

    #[test]
    fn falls_back_to_first_available() {
        let streams = vec![stream("vorbis", 96_000), stream("flac", 900_000)];
        assert_eq!(select_audio_stream(&streams, &prefs()).unwrap().codec, "vorbis");
    }

    #[test]
    fn skips_streams_without_url() {
        let mut empty = stream("opus", 160_000);
        empty.url.clear();
        let streams = vec![empty, stream("mp4a", 128_000)];
        assert_eq!(select_audio_stream(&streams, &prefs()).unwrap().codec, "mp4a");
        assert!(select_audio_stream(&[], &prefs()).is_none());
    }
}
