//! Source resolution across an ordered list of providers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use relaycast_common::{Error, Result};
use tracing::{debug, info, warn};

use super::instances::InstancePool;
use super::provider::{select_audio_stream, ResolvedSource, SourceProvider};
use crate::config::SourcesConfig;

/// Supplies providers in priority order.
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    /// Providers to try, most preferred first.
    async fn providers(&self) -> Vec<Arc<dyn SourceProvider>>;

    /// Note that `provider` just produced a source.
    fn record_success(&self, provider: &str);
}

/// A fixed, ordered provider list.
pub struct StaticProviders {
    providers: Vec<Arc<dyn SourceProvider>>,
}

impl StaticProviders {
    pub fn new(providers: Vec<Arc<dyn SourceProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl ProviderDirectory for StaticProviders {
    async fn providers(&self) -> Vec<Arc<dyn SourceProvider>> {
        self.providers.clone()
    }

    fn record_success(&self, _provider: &str) {}
}

/// Finds a playable audio source for a free-text query.
///
/// Providers are tried in directory order, each bounded by `timeout` per
/// lookup. The first provider yielding a usable stream wins; failures are
/// logged and skipped.
pub struct SourceResolver {
    directory: Arc<dyn ProviderDirectory>,
    timeout: Duration,
    preferred_codecs: Vec<String>,
}

impl SourceResolver {
    pub fn new(
        directory: Arc<dyn ProviderDirectory>,
        timeout: Duration,
        preferred_codecs: Vec<String>,
    ) -> Self {
        Self {
            directory,
            timeout,
            preferred_codecs,
        }
    }

    /// Resolver over the configured instance pool.
    pub fn from_config(config: &SourcesConfig, client: reqwest::Client) -> Self {
        let pool = InstancePool::new(
            client,
            config.registry_url.clone(),
            config.fallback_instances.clone(),
            config.refresh_ttl(),
        );
        Self::new(
            Arc::new(pool),
            config.search_timeout(),
            config.preferred_codecs.clone(),
        )
    }

    /// Resolve `query`, or fail with `NoSourceFound` carrying the last error.
    pub async fn resolve(&self, query: &str) -> Result<ResolvedSource> {
        let providers = self.directory.providers().await;
        let mut last_error = None;

        for provider in providers {
            match self.try_provider(provider.as_ref(), query).await {
                Ok(source) => {
                    info!(
                        provider = provider.name(),
                        title = %source.title,
                        codec = %source.codec,
                        "Resolved source"
                    );
                    self.directory.record_success(provider.name());
                    return Ok(source);
                }
                Err(e) => {
                    warn!(provider = provider.name(), "Provider failed: {:#}", e);
                    last_error = Some(format!("{}: {:#}", provider.name(), e));
                }
            }
        }

        Err(Error::NoSourceFound {
            query: query.to_string(),
            last_error,
        })
    }

    async fn try_provider(
        &self,
        provider: &dyn SourceProvider,
        query: &str,
    ) -> anyhow::Result<ResolvedSource> {
        let hits = tokio::time::timeout(self.timeout, provider.search(query))
            .await
            .map_err(|_| anyhow!("search timed out after {:?}", self.timeout))?
            .context("search failed")?;

        let top = hits.into_iter().next().context("no results")?;
        debug!(provider = provider.name(), hit = %top.id, title = %top.title, "Top search hit");

        let streams = tokio::time::timeout(self.timeout, provider.audio_streams(&top))
            .await
            .map_err(|_| anyhow!("stream lookup timed out after {:?}", self.timeout))?
            .context("stream lookup failed")?;

        let stream = select_audio_stream(&streams, &self.preferred_codecs)
            .context("no audio-only stream offered")?;

        Ok(ResolvedSource {
            provider: provider.name().to_string(),
            title: top.title,
            stream_url: stream.url.clone(),
            codec: stream.codec.clone(),
            mime_type: stream.mime_type.clone(),
            bitrate: stream.bitrate,
        })
    }
}
