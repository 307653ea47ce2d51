//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires a full [`AppContext`] over a
//! directory-backed object store in a temp dir, scripted source providers
//! and the passthrough transcoder. The [`TestHarness::with_server`]
//! constructor starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use relaycast::acquisition::{JobSnapshot, JobStatus, Passthrough};
use relaycast::config::Config;
use relaycast::server::{create_router, AppContext};
use relaycast::sources::{
    AudioStream, SearchHit, SourceProvider, SourceResolver, StaticProviders,
};
use relaycast_common::{JobId, ObjectMetadata};
use relaycast_store::{LocalObjectStore, NewObject, ObjectStore};

/// Folder new downloads land in unless a request names one.
pub const DEFAULT_DESTINATION: &str = "inbox";

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub store: Arc<LocalObjectStore>,
    _dir: TempDir,
}

impl TestHarness {
    /// Harness with no source providers.
    pub async fn new() -> Self {
        Self::with_providers(Vec::new()).await
    }

    /// Harness resolving through `providers`, in order.
    pub async fn with_providers(providers: Vec<Arc<dyn SourceProvider>>) -> Self {
        Self::with_store(providers, |local| Arc::new(local)).await
    }

    /// Harness whose context talks to the store returned by `wrap`, given a
    /// second handle on the same directory. `store` still reads the
    /// directory directly.
    pub async fn with_store<F>(providers: Vec<Arc<dyn SourceProvider>>, wrap: F) -> Self
    where
        F: FnOnce(LocalObjectStore) -> Arc<dyn ObjectStore>,
    {
        let dir = TempDir::new().expect("failed to create temp dir");
        let root = dir.path().join("objects");
        let store = Arc::new(
            LocalObjectStore::open(root.clone())
                .await
                .expect("failed to open local store"),
        );
        let objects = wrap(
            LocalObjectStore::open(root.clone())
                .await
                .expect("failed to open local store"),
        );

        let mut config = Config::default();
        config.acquisition.default_destination = Some(DEFAULT_DESTINATION.to_string());
        config.acquisition.temp_dir = Some(dir.path().join("scratch"));
        config.acquisition.poll_interval_ms = 20;
        config.acquisition.delivery_grace_secs = 1;
        config.acquisition.download_idle_timeout_secs = 5;

        let resolver = SourceResolver::new(
            Arc::new(StaticProviders::new(providers)),
            Duration::from_secs(2),
            config.sources.preferred_codecs.clone(),
        );

        let ctx = AppContext::new(
            config,
            objects,
            resolver,
            Arc::new(Passthrough),
            reqwest::Client::new(),
        );

        Self {
            ctx,
            store,
            _dir: dir,
        }
    }

    /// Start an Axum server on a random port and return the bound address.
    pub async fn serve(&self) -> SocketAddr {
        let app = create_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        addr
    }

    /// Start a harness and its server in one step.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new().await;
        let addr = harness.serve().await;
        (harness, addr)
    }

    /// Store `bytes` as a new object.
    pub async fn put_object(&self, name: &str, mime_type: &str, bytes: &[u8]) -> ObjectMetadata {
        let file = tempfile::NamedTempFile::new().expect("failed to create temp file");
        std::fs::write(file.path(), bytes).expect("failed to write temp file");
        self.store
            .create(
                &NewObject {
                    name: name.to_string(),
                    parent: DEFAULT_DESTINATION.to_string(),
                    mime_type: mime_type.to_string(),
                },
                file.path(),
            )
            .await
            .expect("failed to create object")
    }

    /// Poll a job until it reaches a terminal state, collecting every
    /// distinct snapshot seen on the way.
    pub async fn wait_for_job(&self, id: &JobId) -> Vec<JobSnapshot> {
        let jobs = self.ctx.runner.jobs().clone();
        let mut seen: Vec<JobSnapshot> = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);

        loop {
            let snapshot = jobs.snapshot(id).expect("job vanished while running");
            if seen.last() != Some(&snapshot) {
                seen.push(snapshot.clone());
            }
            if snapshot.status.is_terminal() {
                return seen;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job did not finish, last snapshot: {snapshot:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// A provider that either finds one track with one stream or fails.
pub struct ScriptedProvider {
    name: &'static str,
    title: String,
    stream_url: Option<String>,
}

impl ScriptedProvider {
    /// Provider that resolves every query to `stream_url`.
    pub fn serving(name: &'static str, title: &str, stream_url: &str) -> Arc<dyn SourceProvider> {
        Arc::new(Self {
            name,
            title: title.to_string(),
            stream_url: Some(stream_url.to_string()),
        })
    }

    /// Provider whose search always fails.
    pub fn broken(name: &'static str) -> Arc<dyn SourceProvider> {
        Arc::new(Self {
            name,
            title: String::new(),
            stream_url: None,
        })
    }
}

#[async_trait]
impl SourceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        if self.stream_url.is_none() {
            bail!("{} is down", self.name);
        }
        Ok(vec![SearchHit {
            id: "track1".to_string(),
            title: self.title.clone(),
            duration_secs: Some(180),
        }])
    }

    async fn audio_streams(&self, _hit: &SearchHit) -> Result<Vec<AudioStream>> {
        let url = self.stream_url.clone().unwrap_or_default();
        Ok(vec![AudioStream {
            url,
            codec: "opus".to_string(),
            mime_type: "audio/webm".to_string(),
            bitrate: 128_000,
        }])
    }
}

/// Whether `snapshot` represents a successfully finished job.
pub fn is_completed(snapshot: &JobSnapshot) -> bool {
    snapshot.status == JobStatus::Completed
}

/// Read a file fully, for comparing stored bytes.
pub fn read_all(path: &Path) -> Vec<u8> {
    std::fs::read(path).expect("failed to read file")
}
