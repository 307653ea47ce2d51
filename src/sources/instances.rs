//! Rotating pool of equivalent provider instances.
//!
//! The live instance list comes from a registry URL and is refreshed once it
//! is older than the configured TTL. When the registry is unset or fails, the
//! static fallback list is used. Instances that recently produced a source
//! are tried first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::provider::SourceProvider;
use super::providers::PipedProvider;
use super::resolver::ProviderDirectory;

/// One endpoint of an external provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInstance {
    pub base_url: String,
    /// When this instance last produced a source.
    pub last_known_good: Option<DateTime<Utc>>,
}

impl ProviderInstance {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            last_known_good: None,
        }
    }
}

/// Registry entries are either bare URLs or objects carrying `api_url`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegistryEntry {
    Url(String),
    Instance { api_url: String },
}

impl RegistryEntry {
    fn into_url(self) -> String {
        match self {
            RegistryEntry::Url(url) => url,
            RegistryEntry::Instance { api_url } => api_url,
        }
    }
}

struct PoolState {
    instances: Vec<ProviderInstance>,
    refreshed_at: Option<Instant>,
}

/// [`ProviderDirectory`] over a refreshable set of Piped instances.
pub struct InstancePool {
    client: reqwest::Client,
    registry_url: Option<String>,
    fallback: Vec<String>,
    ttl: Duration,
    state: RwLock<PoolState>,
}

impl InstancePool {
    /// Create a pool. Until the first refresh, the fallback list is served.
    pub fn new(
        client: reqwest::Client,
        registry_url: Option<String>,
        fallback: Vec<String>,
        ttl: Duration,
    ) -> Self {
        let instances = fallback.iter().map(ProviderInstance::new).collect();
        Self {
            client,
            registry_url,
            fallback,
            ttl,
            state: RwLock::new(PoolState {
                instances,
                refreshed_at: None,
            }),
        }
    }

    /// Current instances in try order.
    pub fn instances(&self) -> Vec<ProviderInstance> {
        let mut instances = self.state.read().instances.clone();
        // Stable: instances never seen working keep registry order.
        instances.sort_by(|a, b| b.last_known_good.cmp(&a.last_known_good));
        instances
    }

    fn is_stale(&self) -> bool {
        match self.state.read().refreshed_at {
            Some(at) => at.elapsed() >= self.ttl,
            None => true,
        }
    }

    /// Refresh the instance list from the registry if it is stale.
    pub async fn refresh_if_stale(&self) {
        if self.registry_url.is_none() || !self.is_stale() {
            return;
        }
        self.refresh().await;
    }

    /// Unconditionally refresh from the registry, falling back on failure.
    pub async fn refresh(&self) {
        let Some(registry_url) = self.registry_url.as_deref() else {
            return;
        };

        let fetched = match self.fetch_registry(registry_url).await {
            Ok(urls) if !urls.is_empty() => {
                info!(count = urls.len(), "Refreshed provider instances");
                urls
            }
            Ok(_) => {
                warn!("Instance registry returned no instances, using fallback list");
                self.fallback.clone()
            }
            Err(e) => {
                warn!("Instance registry refresh failed, using fallback list: {:#}", e);
                self.fallback.clone()
            }
        };

        let mut state = self.state.write();
        let previous = std::mem::take(&mut state.instances);
        state.instances = fetched
            .into_iter()
            .map(|url| {
                let mut instance = ProviderInstance::new(url);
                instance.last_known_good = previous
                    .iter()
                    .find(|p| p.base_url == instance.base_url)
                    .and_then(|p| p.last_known_good);
                instance
            })
            .collect();
        state.refreshed_at = Some(Instant::now());
    }

    async fn fetch_registry(&self, url: &str) -> anyhow::Result<Vec<String>> {
        let entries: Vec<RegistryEntry> = self
            .client
            .get(url)
            .send()
            .await
            .context("registry request failed")?
            .error_for_status()
            .context("registry answered with an error")?
            .json()
            .await
            .context("malformed registry response")?;

        let mut urls: Vec<String> = Vec::with_capacity(entries.len());
        for url in entries.into_iter().map(RegistryEntry::into_url) {
            let url = url.trim_end_matches('/').to_string();
            if (url.starts_with("http://") || url.starts_with("https://")) && !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }
}

#[async_trait]
impl ProviderDirectory for InstancePool {
    async fn providers(&self) -> Vec<Arc<dyn SourceProvider>> {
        self.refresh_if_stale().await;
        self.instances()
            .into_iter()
            .map(|i| Arc::new(PipedProvider::new(self.client.clone(), i.base_url)) as Arc<dyn SourceProvider>)
            .collect()
    }

    fn record_success(&self, provider: &str) {
        let mut state = self.state.write();
        if let Some(instance) = state.instances.iter_mut().find(|i| i.base_url == provider) {
            instance.last_known_good = Some(Utc::now());
            debug!(instance = provider, "Marked instance as last known good");
        }
    }
}
